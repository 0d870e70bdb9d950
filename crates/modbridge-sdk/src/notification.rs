//! Request notification masks, subscriptions and verdicts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A set of request-pipeline notifications, as passed to
/// `SetRequestNotifications` and to the dispatcher.
///
/// Bits the emulation does not know are preserved verbatim.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestNotifications(pub u32);

impl RequestNotifications {
    /// No notifications.
    pub const NONE: Self = Self(0);
    /// `RQ_BEGIN_REQUEST`.
    pub const BEGIN_REQUEST: Self = Self(0x0000_0001);
    /// `RQ_AUTHENTICATE_REQUEST`.
    pub const AUTHENTICATE_REQUEST: Self = Self(0x0000_0002);
    /// `RQ_AUTHORIZE_REQUEST`.
    pub const AUTHORIZE_REQUEST: Self = Self(0x0000_0004);
    /// `RQ_RESOLVE_REQUEST_CACHE`.
    pub const RESOLVE_REQUEST_CACHE: Self = Self(0x0000_0008);
    /// `RQ_MAP_REQUEST_HANDLER`.
    pub const MAP_REQUEST_HANDLER: Self = Self(0x0000_0010);
    /// `RQ_ACQUIRE_REQUEST_STATE`.
    pub const ACQUIRE_REQUEST_STATE: Self = Self(0x0000_0020);
    /// `RQ_PRE_EXECUTE_REQUEST_HANDLER`.
    pub const PRE_EXECUTE_REQUEST_HANDLER: Self = Self(0x0000_0040);
    /// `RQ_EXECUTE_REQUEST_HANDLER`.
    pub const EXECUTE_REQUEST_HANDLER: Self = Self(0x0000_0080);
    /// `RQ_RELEASE_REQUEST_STATE`.
    pub const RELEASE_REQUEST_STATE: Self = Self(0x0000_0100);
    /// `RQ_UPDATE_REQUEST_CACHE`.
    pub const UPDATE_REQUEST_CACHE: Self = Self(0x0000_0200);
    /// `RQ_LOG_REQUEST`.
    pub const LOG_REQUEST: Self = Self(0x0000_0400);
    /// `RQ_END_REQUEST`.
    pub const END_REQUEST: Self = Self(0x0000_0800);
    /// `RQ_CUSTOM_NOTIFICATION`.
    pub const CUSTOM_NOTIFICATION: Self = Self(0x1000_0000);
    /// `RQ_SEND_RESPONSE`.
    pub const SEND_RESPONSE: Self = Self(0x2000_0000);
    /// `RQ_READ_ENTITY`.
    pub const READ_ENTITY: Self = Self(0x4000_0000);
    /// `RQ_MAP_PATH`.
    pub const MAP_PATH: Self = Self(0x8000_0000);

    const NAMED: [(Self, &'static str); 16] = [
        (Self::BEGIN_REQUEST, "BEGIN_REQUEST"),
        (Self::AUTHENTICATE_REQUEST, "AUTHENTICATE_REQUEST"),
        (Self::AUTHORIZE_REQUEST, "AUTHORIZE_REQUEST"),
        (Self::RESOLVE_REQUEST_CACHE, "RESOLVE_REQUEST_CACHE"),
        (Self::MAP_REQUEST_HANDLER, "MAP_REQUEST_HANDLER"),
        (Self::ACQUIRE_REQUEST_STATE, "ACQUIRE_REQUEST_STATE"),
        (Self::PRE_EXECUTE_REQUEST_HANDLER, "PRE_EXECUTE_REQUEST_HANDLER"),
        (Self::EXECUTE_REQUEST_HANDLER, "EXECUTE_REQUEST_HANDLER"),
        (Self::RELEASE_REQUEST_STATE, "RELEASE_REQUEST_STATE"),
        (Self::UPDATE_REQUEST_CACHE, "UPDATE_REQUEST_CACHE"),
        (Self::LOG_REQUEST, "LOG_REQUEST"),
        (Self::END_REQUEST, "END_REQUEST"),
        (Self::CUSTOM_NOTIFICATION, "CUSTOM_NOTIFICATION"),
        (Self::SEND_RESPONSE, "SEND_RESPONSE"),
        (Self::READ_ENTITY, "READ_ENTITY"),
        (Self::MAP_PATH, "MAP_PATH"),
    ];

    /// The raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Iterates the individual bits that are set, lowest first.
    pub fn iter(self) -> impl Iterator<Item = Self> {
        (0..u32::BITS)
            .map(|shift| 1u32 << shift)
            .filter(move |bit| self.0 & bit != 0)
            .map(Self)
    }

    /// Name of a single-bit value, if it is a known notification.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(value, _)| *value == self)
            .map(|(_, name)| *name)
    }

    /// Display names of all set bits; unknown bits render as hex.
    pub fn names(self) -> Vec<String> {
        self.iter()
            .map(|bit| {
                bit.name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{:#010X}", bit.0))
            })
            .collect()
    }
}

impl std::ops::BitOr for RequestNotifications {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for RequestNotifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestNotifications({})", self)
    }
}

impl fmt::Display for RequestNotifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        write!(f, "{}", self.names().join("|"))
    }
}

impl From<u32> for RequestNotifications {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

/// Which pipeline events, and in which priority class, a module registered for.
///
/// Captured once during registration and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationSubscription {
    request: RequestNotifications,
    post_request: RequestNotifications,
}

impl NotificationSubscription {
    /// Creates a subscription from the two masks passed to `SetRequestNotifications`.
    pub const fn new(request: RequestNotifications, post_request: RequestNotifications) -> Self {
        Self {
            request,
            post_request,
        }
    }

    /// Main (pre) notification mask.
    pub const fn request_mask(&self) -> RequestNotifications {
        self.request
    }

    /// Post notification mask.
    pub const fn post_request_mask(&self) -> RequestNotifications {
        self.post_request
    }

    /// Whether the module wants `notification` in the given priority class.
    pub const fn wants(&self, notification: RequestNotifications, is_post: bool) -> bool {
        if is_post {
            self.post_request.contains(notification)
        } else {
            self.request.contains(notification)
        }
    }
}

/// Raw `REQUEST_NOTIFICATION_STATUS` value returned by module handlers.
pub type RawNotificationStatus = i32;

/// `RQ_NOTIFICATION_CONTINUE`.
pub const RQ_NOTIFICATION_CONTINUE: RawNotificationStatus = 0;
/// `RQ_NOTIFICATION_PENDING`.
pub const RQ_NOTIFICATION_PENDING: RawNotificationStatus = 1;
/// `RQ_NOTIFICATION_FINISH_REQUEST`.
pub const RQ_NOTIFICATION_FINISH_REQUEST: RawNotificationStatus = 2;

/// Pipeline-control verdict a module returns from a notification handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationVerdict {
    /// Continue processing the request.
    Continue,
    /// The module completes the notification asynchronously.
    Pending,
    /// Stop processing and finish the request.
    FinishRequest,
    /// A value outside the known set, kept as returned.
    Unrecognized(RawNotificationStatus),
}

impl NotificationVerdict {
    /// Converts a raw status as returned by a module.
    pub const fn from_raw(raw: RawNotificationStatus) -> Self {
        match raw {
            RQ_NOTIFICATION_CONTINUE => Self::Continue,
            RQ_NOTIFICATION_PENDING => Self::Pending,
            RQ_NOTIFICATION_FINISH_REQUEST => Self::FinishRequest,
            other => Self::Unrecognized(other),
        }
    }

    /// The raw status value.
    pub const fn raw(self) -> RawNotificationStatus {
        match self {
            Self::Continue => RQ_NOTIFICATION_CONTINUE,
            Self::Pending => RQ_NOTIFICATION_PENDING,
            Self::FinishRequest => RQ_NOTIFICATION_FINISH_REQUEST,
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for NotificationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "CONTINUE"),
            Self::Pending => write!(f, "PENDING"),
            Self::FinishRequest => write!(f, "FINISH_REQUEST"),
            Self::Unrecognized(raw) => write!(f, "UNRECOGNIZED({raw})"),
        }
    }
}
