//! Delivery engine: bounded retries with format fallback.
//!
//! The retry/fallback policy is an explicit state loop so it can be audited
//! and unit-tested against a scripted transport, away from the network.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;

use attache_types::{Event, EventLevel, EventSink};

use crate::api::{SendMessageParams, SendOutcome, Transport};
use crate::markdown::sanitize;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_UNIT: Duration = Duration::from_millis(1000);
const COMPONENT: &str = "delivery";

/// Requested rendering for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// Transport markdown; falls back to plain on a parse rejection.
    Rich,
    /// Sanitized but sent without a parse mode.
    Plain,
}

/// Port for recording delivered messages into chat history.
///
/// Implementations are called from a detached task after a successful
/// delivery; a failure is logged, never surfaced to the sender.
pub trait ChatHistory: Send + Sync {
    fn record(&self, chat_id: i64, role: &str, text: &str) -> anyhow::Result<()>;
}

/// States of one delivery.
#[derive(Debug)]
enum Step {
    Attempt { attempt: u32 },
    FormatFallback { attempt: u32 },
    Backoff { attempt: u32 },
    Terminal { delivered: bool },
}

pub struct DeliveryEngine {
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventSink>,
    history: Option<Arc<dyn ChatHistory>>,
}

impl DeliveryEngine {
    pub fn new(transport: Arc<dyn Transport>, events: Arc<dyn EventSink>) -> Self {
        Self {
            transport,
            events,
            history: None,
        }
    }

    /// Record successful deliveries into chat history.
    pub fn with_history(mut self, history: Arc<dyn ChatHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Deliver `text` to `chat_id`.
    ///
    /// `true` means the transport accepted the message; `false` means the
    /// retry budget was exhausted or the transport rejected it terminally.
    /// Never returns an error; failure is the boolean.
    pub async fn deliver(
        &self,
        chat_id: i64,
        text: &str,
        format: Option<MessageFormat>,
    ) -> bool {
        let text = match format {
            Some(_) => sanitize(text),
            None => text.to_string(),
        };
        let mut parse_mode =
            matches!(format, Some(MessageFormat::Rich)).then(|| "Markdown".to_string());
        let mut fell_back = false;

        let mut step = Step::Attempt { attempt: 1 };
        loop {
            step = match step {
                Step::Attempt { attempt } => {
                    let params = SendMessageParams {
                        chat_id,
                        text: text.clone(),
                        parse_mode: parse_mode.clone(),
                    };
                    match self.transport.send(&params).await {
                        Ok(SendOutcome::Delivered) => {
                            self.attempt_event(EventLevel::Info, attempt, chat_id, "delivered");
                            Step::Terminal { delivered: true }
                        }
                        Ok(SendOutcome::BadRequest(description)) => {
                            self.attempt_event(
                                EventLevel::Warn,
                                attempt,
                                chat_id,
                                &format!("bad request: {description}"),
                            );
                            if parse_mode.is_some() && !fell_back {
                                Step::FormatFallback { attempt }
                            } else {
                                Step::Terminal { delivered: false }
                            }
                        }
                        Ok(SendOutcome::Rejected {
                            status,
                            description,
                        }) => {
                            self.attempt_event(
                                EventLevel::Error,
                                attempt,
                                chat_id,
                                &format!("rejected ({status}): {description}"),
                            );
                            Step::Terminal { delivered: false }
                        }
                        Ok(SendOutcome::ServerError(status)) => {
                            self.attempt_event(
                                EventLevel::Warn,
                                attempt,
                                chat_id,
                                &format!("server error ({status})"),
                            );
                            if attempt < MAX_ATTEMPTS {
                                Step::Backoff { attempt }
                            } else {
                                Step::Terminal { delivered: false }
                            }
                        }
                        Err(e) => {
                            self.attempt_event(
                                EventLevel::Warn,
                                attempt,
                                chat_id,
                                &format!("transport error: {e:#}"),
                            );
                            if attempt < MAX_ATTEMPTS {
                                Step::Backoff { attempt }
                            } else {
                                Step::Terminal { delivered: false }
                            }
                        }
                    }
                }
                Step::FormatFallback { attempt } => {
                    // One shot: rich rendering is gone for the rest of this delivery.
                    fell_back = true;
                    parse_mode = None;
                    Step::Attempt {
                        attempt: attempt + 1,
                    }
                }
                Step::Backoff { attempt } => {
                    sleep(BACKOFF_UNIT * attempt).await;
                    Step::Attempt {
                        attempt: attempt + 1,
                    }
                }
                Step::Terminal { delivered } => {
                    if delivered {
                        self.record_history(chat_id, text.clone());
                    } else {
                        self.events.emit(Event::new(
                            EventLevel::Error,
                            COMPONENT,
                            "delivery-failed",
                            format!("giving up on chat {chat_id}"),
                        ));
                    }
                    return delivered;
                }
            };
        }
    }

    /// Detached, best-effort history write; never awaited by the caller.
    fn record_history(&self, chat_id: i64, text: String) {
        let Some(history) = self.history.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = history.record(chat_id, "assistant", &text) {
                tracing::warn!("failed to record delivered message: {e:#}");
            }
        });
    }

    fn attempt_event(&self, level: EventLevel, attempt: u32, chat_id: i64, outcome: &str) {
        self.events.emit(
            Event::new(
                level,
                COMPONENT,
                "send-attempt",
                format!("attempt {attempt}/{MAX_ATTEMPTS}: {outcome}"),
            )
            .payload(json!({ "attempt": attempt, "chat_id": chat_id })),
        );
    }
}
