//! Sinks for failures that happen on a consumer thread, where there is no
//! caller left to return an error to.

use crate::message::{ErrorMessage, ErrorPayload, MessageBuilder, MessageHeaders};
use crate::{ChannelRegistry, MessagingError};
use std::error::Error as _;
use std::sync::Arc;
use tracing::error;

/// Receives consumer-side failures.
///
/// `failed` carries the headers of the message being processed, if any.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, error: MessagingError, failed: Option<&MessageHeaders>);
}

/// Logs every failure at `error` level. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn handle_error(&self, error: MessagingError, failed: Option<&MessageHeaders>) {
        error!(
            message_id = ?failed.map(MessageHeaders::id),
            error = %describe(&error),
            "message handling failed"
        );
    }
}

/// Publishes failures as [`ErrorMessage`]s.
///
/// The target is the failed message's `error_channel` header, falling back to
/// a default channel name. If neither resolves the failure is logged.
pub struct MessagePublishingErrorHandler {
    registry: Arc<ChannelRegistry<ErrorPayload>>,
    default_channel: Option<String>,
}

impl MessagePublishingErrorHandler {
    pub fn new(registry: Arc<ChannelRegistry<ErrorPayload>>) -> Self {
        Self {
            registry,
            default_channel: None,
        }
    }

    pub fn with_default_channel(mut self, name: impl Into<String>) -> Self {
        self.default_channel = Some(name.into());
        self
    }

    fn publish(&self, message: ErrorMessage, target: Option<&str>) -> Result<(), MessagingError> {
        let name = target.ok_or(MessagingError::NoDestination)?;
        self.registry.resolve(name)?.send(message)
    }
}

impl ErrorHandler for MessagePublishingErrorHandler {
    fn handle_error(&self, error: MessagingError, failed: Option<&MessageHeaders>) {
        let target = failed
            .and_then(MessageHeaders::error_channel)
            .or(self.default_channel.as_deref());

        let mut builder = MessageBuilder::with_payload(ErrorPayload {
            description: describe(&error),
            failed_headers: failed.cloned(),
        });
        if let Some(correlation) = failed.and_then(MessageHeaders::correlation_id) {
            builder = builder.correlation_id(correlation.clone());
        }

        if let Err(send_error) = self.publish(builder.build(), target) {
            error!(
                message_id = ?failed.map(MessageHeaders::id),
                error = %describe(&error),
                send_error = %send_error,
                "failed to publish error message"
            );
        }
    }
}

/// The error and its source chain on one line.
fn describe(error: &MessagingError) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}
