//! Notification dispatcher.
//!
//! Only the main begin-request notification reaches the module. Every
//! other combination passes through as `CONTINUE` without a call. Dispatch
//! is synchronous and single-shot.

use tracing::{debug, error, trace};

use modbridge_core::{AppError, AppResult};
use modbridge_sdk::abi::CHttpModule;
use modbridge_sdk::notification::{NotificationVerdict, RequestNotifications};

use crate::context::ExecutionContext;
use crate::factory::ModuleInstance;

/// Where a `(notification, is_post)` pair is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `OnBeginRequest` on the module.
    BeginRequest,
    /// Not delivered; the verdict is `CONTINUE`.
    PassThrough,
}

impl Route {
    /// Routes a notification.
    pub fn of(notification: RequestNotifications, is_post: bool) -> Self {
        if notification == RequestNotifications::BEGIN_REQUEST && !is_post {
            Self::BeginRequest
        } else {
            Self::PassThrough
        }
    }
}

/// Delivers one notification to `instance` through `context`.
///
/// Returns the module's verdict unchanged, or `NotImplemented` if the
/// handler touched a context member the emulation does not provide.
pub fn dispatch(
    instance: &ModuleInstance,
    context: &ExecutionContext,
    notification: RequestNotifications,
    is_post: bool,
) -> AppResult<NotificationVerdict> {
    match Route::of(notification, is_post) {
        Route::PassThrough => {
            trace!(
                instance = %instance.id(),
                notification = %notification,
                is_post = is_post,
                "Notification passed through"
            );
            Ok(NotificationVerdict::Continue)
        }
        Route::BeginRequest => {
            context.take_fault();
            let raw = unsafe {
                CHttpModule::on_begin_request(
                    instance.as_raw(),
                    context.as_raw(),
                    std::ptr::null_mut(),
                )
            };

            if let Some(member) = context.take_fault() {
                error!(
                    instance = %instance.id(),
                    context = %context.id(),
                    member = member,
                    "Dispatch failed: module exceeded the emulated context"
                );
                return Err(AppError::not_implemented(format!(
                    "Module called unimplemented context member '{member}' during BEGIN_REQUEST"
                )));
            }

            let verdict = NotificationVerdict::from_raw(raw);
            debug!(
                instance = %instance.id(),
                context = %context.id(),
                verdict = %verdict,
                "BEGIN_REQUEST dispatched"
            );
            Ok(verdict)
        }
    }
}
