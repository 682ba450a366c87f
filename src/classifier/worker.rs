//! Classifier hosted in a child process.
//!
//! The worker reads one JSON request per line on stdin and answers with one
//! JSON object per line on stdout:
//!
//! ```text
//! -> {"action":"load","model":"quickdraw-mobilevit-small","quantized":false}
//! <- {"status":"ready"}
//! -> {"action":"classify","id":7,"image":{"width":64,"height":64,"data":[0,0,255,...]}}
//! <- {"status":"result","id":7,"data":[{"label":"cat","score":0.41},...]}
//! <- {"status":"error","id":7,"data":"out of memory"}
//! ```
//!
//! `update` messages (download progress and the like) are accepted and
//! ignored.

use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ClassificationService, ClassifierError, Prediction, RequestTicket, ServiceEvent};
use crate::config::ModelConfig;
use crate::raster::Bitmap;

#[derive(Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum WorkerRequest<'a> {
    Load { model: &'a str, quantized: bool },
    Classify { id: u64, image: &'a Bitmap },
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
enum WorkerResponse {
    Ready {},
    Update {},
    Result {
        id: u64,
        data: Vec<Prediction>,
    },
    Error {
        #[serde(default)]
        id: Option<u64>,
        #[serde(default)]
        data: serde_json::Value,
    },
}

#[derive(Debug, PartialEq)]
enum WorkerMessage {
    Response(WorkerResponse),
    Garbled(String),
    Exited,
}

fn decode_line(line: &str) -> WorkerMessage {
    match serde_json::from_str::<WorkerResponse>(line) {
        Ok(response) => WorkerMessage::Response(response),
        Err(err) => WorkerMessage::Garbled(format!("{}: {}", err, line)),
    }
}

fn error_text(data: &serde_json::Value) -> String {
    match data {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "classifier error".to_string(),
        other => other.to_string(),
    }
}

struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    messages: Receiver<WorkerMessage>,
}

impl WorkerProcess {
    fn spawn(program: &str, args: &[String]) -> Result<Self, ClassifierError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(ClassifierError::Spawn)?;

        let stdin = child.stdin.take().ok_or(ClassifierError::Disconnected)?;
        let stdout = child.stdout.take().ok_or(ClassifierError::Disconnected)?;
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if tx.send(decode_line(&line)).is_err() {
                    return;
                }
            }
            let _ = tx.send(WorkerMessage::Exited);
        });

        Ok(Self {
            child,
            stdin,
            messages: rx,
        })
    }

    fn send(&mut self, request: &WorkerRequest) -> Result<(), ClassifierError> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        self.stdin.write_all(&line)?;
        self.stdin.flush()?;
        Ok(())
    }

    fn shutdown(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct WorkerClassifier {
    program: String,
    args: Vec<String>,
    model: ModelConfig,
    process: Option<WorkerProcess>,
    loading: bool,
    in_flight: HashMap<u64, RequestTicket>,
    backlog: VecDeque<ServiceEvent>,
}

impl WorkerClassifier {
    pub fn new(program: impl Into<String>, args: Vec<String>, model: ModelConfig) -> Self {
        Self {
            program: program.into(),
            args,
            model,
            process: None,
            loading: false,
            in_flight: HashMap::new(),
            backlog: VecDeque::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    fn process(&mut self) -> Result<&mut WorkerProcess, ClassifierError> {
        if self.process.is_none() {
            debug!(program = %self.program, "spawning classifier worker");
            self.process = Some(WorkerProcess::spawn(&self.program, &self.args)?);
        }
        self.process.as_mut().ok_or(ClassifierError::Disconnected)
    }

    /// Every unanswered request is answered with `reason` so nobody waits
    /// forever on a worker that is gone.
    fn abandon_in_flight(&mut self, reason: &str) {
        for (_, ticket) in self.in_flight.drain() {
            self.backlog.push_back(ServiceEvent::Classified {
                ticket,
                outcome: Err(reason.to_string()),
            });
        }
        if std::mem::take(&mut self.loading) {
            self.backlog
                .push_back(ServiceEvent::LoadFailed(reason.to_string()));
        }
    }

    fn translate(&mut self, response: WorkerResponse) -> Option<ServiceEvent> {
        match response {
            WorkerResponse::Ready {} => {
                self.loading = false;
                Some(ServiceEvent::Ready)
            }
            WorkerResponse::Update {} => None,
            WorkerResponse::Result { id, data } => match self.in_flight.remove(&id) {
                Some(ticket) => Some(ServiceEvent::Classified {
                    ticket,
                    outcome: Ok(data),
                }),
                None => {
                    warn!(id, "classifier answered a request it was never sent");
                    None
                }
            },
            WorkerResponse::Error { id, data } => {
                let message = error_text(&data);
                match id {
                    Some(id) => self.in_flight.remove(&id).map(|ticket| {
                        ServiceEvent::Classified {
                            ticket,
                            outcome: Err(message),
                        }
                    }),
                    None if self.loading => {
                        self.loading = false;
                        Some(ServiceEvent::LoadFailed(message))
                    }
                    None => {
                        self.abandon_in_flight(&message);
                        self.backlog.pop_front()
                    }
                }
            }
        }
    }
}

impl ClassificationService for WorkerClassifier {
    fn load(&mut self) -> Result<(), ClassifierError> {
        let model = self.model.clone();
        self.process()?.send(&WorkerRequest::Load {
            model: &model.name,
            quantized: model.quantized,
        })?;
        self.loading = true;
        Ok(())
    }

    fn classify(&mut self, ticket: RequestTicket, bitmap: Bitmap) -> Result<(), ClassifierError> {
        let process = self.process.as_mut().ok_or(ClassifierError::Disconnected)?;
        process.send(&WorkerRequest::Classify {
            id: ticket.seq,
            image: &bitmap,
        })?;
        self.in_flight.insert(ticket.seq, ticket);
        Ok(())
    }

    fn poll(&mut self) -> Option<ServiceEvent> {
        loop {
            if let Some(event) = self.backlog.pop_front() {
                return Some(event);
            }
            let message = match self.process.as_ref()?.messages.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => WorkerMessage::Exited,
            };
            match message {
                WorkerMessage::Response(response) => {
                    if let Some(event) = self.translate(response) {
                        return Some(event);
                    }
                }
                WorkerMessage::Garbled(line) => warn!(%line, "unreadable classifier output"),
                WorkerMessage::Exited => {
                    warn!("classifier worker exited");
                    if let Some(process) = self.process.take() {
                        process.shutdown();
                    }
                    self.abandon_in_flight("classifier worker exited");
                }
            }
        }
    }

    fn reload(&mut self, model: &ModelConfig) -> Result<(), ClassifierError> {
        if let Some(process) = self.process.take() {
            process.shutdown();
        }
        self.abandon_in_flight("classifier reloaded");
        // the old load is superseded, not failed
        self.backlog
            .retain(|event| !matches!(event, ServiceEvent::LoadFailed(_)));
        self.model = model.clone();
        self.load()
    }
}

impl Drop for WorkerClassifier {
    fn drop(&mut self) {
        if let Some(process) = self.process.take() {
            process.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_ready_and_update() {
        assert_eq!(
            decode_line(r#"{"status":"ready"}"#),
            WorkerMessage::Response(WorkerResponse::Ready {})
        );
        assert_eq!(
            decode_line(r#"{"status":"update","file":"model.onnx","progress":42}"#),
            WorkerMessage::Response(WorkerResponse::Update {})
        );
    }

    #[test]
    fn decode_result() {
        let message =
            decode_line(r#"{"status":"result","id":3,"data":[{"label":"cat","score":0.5}]}"#);
        assert_eq!(
            message,
            WorkerMessage::Response(WorkerResponse::Result {
                id: 3,
                data: vec![Prediction::new("cat", 0.5)],
            })
        );
    }

    #[test]
    fn decode_error_without_id() {
        let message = decode_line(r#"{"status":"error","data":"bad image"}"#);
        match message {
            WorkerMessage::Response(WorkerResponse::Error { id, data }) => {
                assert_eq!(id, None);
                assert_eq!(error_text(&data), "bad image");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decode_garbage() {
        assert!(matches!(decode_line("hello"), WorkerMessage::Garbled(_)));
    }

    #[test]
    fn request_wire_format() {
        let bitmap = Bitmap {
            width: 1,
            height: 1,
            data: vec![255],
        };
        let json = serde_json::to_string(&WorkerRequest::Classify {
            id: 9,
            image: &bitmap,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"action":"classify","id":9,"image":{"width":1,"height":1,"data":[255]}}"#
        );
    }

    #[test]
    fn classify_without_worker_is_disconnected() {
        let mut worker = WorkerClassifier::new("true", vec![], ModelConfig::default());
        let ticket = RequestTicket {
            seq: 0,
            round: crate::session::RoundId {
                generation: 0,
                target_index: 0,
            },
        };
        assert!(matches!(
            worker.classify(ticket, Bitmap::blank(1, 1)),
            Err(ClassifierError::Disconnected)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn talks_to_a_shell_worker() {
        use std::time::{Duration, Instant};

        let script = r#"read line; echo '{"status":"ready"}'; read line; echo '{"status":"result","id":0,"data":[{"label":"cat","score":0.9}]}'; read line"#;
        let mut worker = WorkerClassifier::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            ModelConfig::default(),
        );

        let wait_for = |worker: &mut WorkerClassifier| {
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                if let Some(event) = worker.poll() {
                    return event;
                }
                assert!(Instant::now() < deadline, "worker never answered");
                thread::sleep(Duration::from_millis(5));
            }
        };

        worker.load().unwrap();
        assert_eq!(wait_for(&mut worker), ServiceEvent::Ready);

        let ticket = RequestTicket {
            seq: 0,
            round: crate::session::RoundId {
                generation: 1,
                target_index: 0,
            },
        };
        worker.classify(ticket, Bitmap::blank(2, 2)).unwrap();
        assert_eq!(
            wait_for(&mut worker),
            ServiceEvent::Classified {
                ticket,
                outcome: Ok(vec![Prediction::new("cat", 0.9)]),
            }
        );
    }
}
