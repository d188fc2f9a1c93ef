use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the builder process a log line came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogStream {
    #[serde(rename = "STDOUT")]
    Stdout,
    #[serde(rename = "STDERR")]
    Stderr,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Started,
    Completed,
    Failed,
    Interruption,
}

/// Tagged events published on a build's channel. Clients key on `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Title { text: String },
    Message { text: String, stream: LogStream },
    Phase { name: String, status: EventStatus },
    Step { name: String, status: EventStatus },
}

/// Publisher half of one build's event channel. Sends never block, and a
/// vanished consumer never stalls the build.
#[derive(Clone)]
pub struct EventStream {
    build_id: Uuid,
    tx: flume::Sender<StreamEvent>,
}

impl EventStream {
    pub fn new(build_id: Uuid) -> (Self, flume::Receiver<StreamEvent>) {
        let (tx, rx) = flume::unbounded();
        (Self { build_id, tx }, rx)
    }

    /// The channel is named by the build it narrates.
    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    pub fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }

    pub fn title(&self, text: impl Into<String>) {
        self.emit(StreamEvent::Title { text: text.into() });
    }

    pub fn message(&self, text: impl Into<String>, stream: LogStream) {
        self.emit(StreamEvent::Message {
            text: text.into(),
            stream,
        });
    }

    pub fn phase(&self, name: &str, status: EventStatus) {
        self.emit(StreamEvent::Phase {
            name: name.to_string(),
            status,
        });
    }

    pub fn step(&self, name: &str, status: EventStatus) {
        self.emit(StreamEvent::Step {
            name: name.to_string(),
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialise_with_wire_tags() {
        let event = StreamEvent::Message {
            text: "compiling".to_string(),
            stream: LogStream::Stdout,
        };
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "message");
        assert_eq!(wire["stream"], "STDOUT");

        let event = StreamEvent::Phase {
            name: "preparation".to_string(),
            status: EventStatus::Interruption,
        };
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "phase");
        assert_eq!(wire["status"], "interruption");
    }

    #[test]
    fn dropped_receiver_does_not_block_sends() {
        let (stream, rx) = EventStream::new(Uuid::new_v4());
        drop(rx);
        stream.title("still fine");
        stream.step("init_build_spec", EventStatus::Started);
    }
}
