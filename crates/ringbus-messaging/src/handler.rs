use crate::{Message, MessagingError};
use ringbus::BoxError;

/// Consumes messages delivered by a dispatcher.
///
/// Implemented for any `Fn(&Message<P>) -> Result<(), BoxError>`.
pub trait MessageHandler<P>: Send + Sync {
    fn handle_message(&self, message: &Message<P>) -> Result<(), BoxError>;
}

impl<P, F> MessageHandler<P> for F
where
    F: Fn(&Message<P>) -> Result<(), BoxError> + Send + Sync,
{
    fn handle_message(&self, message: &Message<P>) -> Result<(), BoxError> {
        self(message)
    }
}

/// Something messages can be sent to.
///
/// Implemented for any `Fn(Message<P>) -> Result<(), MessagingError>`.
pub trait MessageChannel<P>: Send + Sync {
    fn send(&self, message: Message<P>) -> Result<(), MessagingError>;
}

impl<P, F> MessageChannel<P> for F
where
    F: Fn(Message<P>) -> Result<(), MessagingError> + Send + Sync,
{
    fn send(&self, message: Message<P>) -> Result<(), MessagingError> {
        self(message)
    }
}
