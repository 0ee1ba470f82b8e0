//! Owner-facing notifications - the single sink every component publishes to.
//!
//! Components hold a [`NotifySender`]; the bot drains the receiving end and
//! renders buttons. Wiring happens at construction in the daemon, so no
//! component ever imports the bot.

use tokio::sync::mpsc;
use tracing::warn;

use crate::intent::CallbackIntent;

/// One inline button: visible label plus its typed intent.
#[derive(Debug, Clone)]
pub struct Button {
    pub label: String,
    pub intent: CallbackIntent,
}

impl Button {
    pub fn new(label: impl Into<String>, intent: CallbackIntent) -> Self {
        Self {
            label: label.into(),
            intent,
        }
    }
}

/// Message bound for the owner's control channel.
#[derive(Debug, Clone)]
pub struct Notification {
    pub text: String,
    /// Inline keyboard rows; empty means no keyboard.
    pub keyboard: Vec<Vec<Button>>,
}

impl Notification {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Vec<Vec<Button>>) -> Self {
        Self {
            text: text.into(),
            keyboard,
        }
    }
}

/// Cloneable handle for publishing [`Notification`]s.
#[derive(Clone)]
pub struct NotifySender {
    tx: mpsc::Sender<Notification>,
}

impl NotifySender {
    /// Create a sender/receiver pair. The receiver goes to the bot's
    /// delivery task.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Publish a notification. Delivery failures are logged, never propagated:
    /// a dead bot must not take down ingest or the scheduler.
    pub async fn send(&self, notification: Notification) {
        if self.tx.send(notification).await.is_err() {
            warn!("notification channel closed — owner message dropped");
        }
    }

    pub async fn send_text(&self, text: impl Into<String>) {
        self.send(Notification::text(text)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = NotifySender::channel(4);
        tx.send_text("hello").await;
        let got = rx.recv().await.unwrap();
        assert_eq!(got.text, "hello");
        assert!(got.keyboard.is_empty());
    }

    #[tokio::test]
    async fn send_on_closed_channel_is_silent() {
        let (tx, rx) = NotifySender::channel(1);
        drop(rx);
        // Must not panic or error.
        tx.send_text("into the void").await;
    }

    #[tokio::test]
    async fn keyboard_rows_survive_transport() {
        let (tx, mut rx) = NotifySender::channel(1);
        let note = Notification::with_keyboard(
            "pick one",
            vec![vec![
                Button::new("✅", CallbackIntent::TaskDone(1)),
                Button::new("➡️", CallbackIntent::TaskPostpone(1)),
            ]],
        );
        tx.send(note).await;
        let got = rx.recv().await.unwrap();
        assert_eq!(got.keyboard.len(), 1);
        assert_eq!(got.keyboard[0].len(), 2);
        assert_eq!(got.keyboard[0][0].intent, CallbackIntent::TaskDone(1));
    }
}
