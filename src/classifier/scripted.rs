use std::collections::VecDeque;

use super::{ClassificationService, ClassifierError, Prediction, RequestTicket, ServiceEvent};
use crate::config::ModelConfig;
use crate::raster::Bitmap;

/// Classifier driven by hand, for headless sessions and tests.
///
/// Requests queue up until the driver answers them with [`respond`] or
/// [`fail`]; answers are handed out oldest first through `poll`.
///
/// [`respond`]: ScriptedClassifier::respond
/// [`fail`]: ScriptedClassifier::fail
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    events: VecDeque<ServiceEvent>,
    pending: VecDeque<(RequestTicket, Bitmap)>,
    manual_ready: bool,
    load_failure: Option<String>,
    load_requests: usize,
    model: Option<ModelConfig>,
    dispatched: usize,
    in_flight: usize,
    max_in_flight: usize,
    last_bitmap: Option<Bitmap>,
}

impl ScriptedClassifier {
    /// Becomes ready as soon as it is asked to load
    pub fn new() -> Self {
        Self::default()
    }

    /// Stays loading until [`ScriptedClassifier::signal_ready`]
    pub fn with_manual_ready() -> Self {
        Self {
            manual_ready: true,
            ..Self::default()
        }
    }

    pub fn with_load_failure(message: impl Into<String>) -> Self {
        Self {
            load_failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn signal_ready(&mut self) {
        self.events.push_back(ServiceEvent::Ready);
    }

    /// Answer the oldest unanswered request. Returns its ticket.
    pub fn respond(&mut self, predictions: Vec<Prediction>) -> Option<RequestTicket> {
        let (ticket, _) = self.pending.pop_front()?;
        self.events.push_back(ServiceEvent::Classified {
            ticket,
            outcome: Ok(predictions),
        });
        Some(ticket)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Option<RequestTicket> {
        let (ticket, _) = self.pending.pop_front()?;
        self.events.push_back(ServiceEvent::Classified {
            ticket,
            outcome: Err(message.into()),
        });
        Some(ticket)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Most requests ever awaiting an answer at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn load_requests(&self) -> usize {
        self.load_requests
    }

    pub fn model(&self) -> Option<&ModelConfig> {
        self.model.as_ref()
    }

    pub fn last_bitmap(&self) -> Option<&Bitmap> {
        self.last_bitmap.as_ref()
    }
}

impl ClassificationService for ScriptedClassifier {
    fn load(&mut self) -> Result<(), ClassifierError> {
        self.load_requests += 1;
        if let Some(message) = &self.load_failure {
            self.events
                .push_back(ServiceEvent::LoadFailed(message.clone()));
        } else if !self.manual_ready {
            self.events.push_back(ServiceEvent::Ready);
        }
        Ok(())
    }

    fn classify(&mut self, ticket: RequestTicket, bitmap: Bitmap) -> Result<(), ClassifierError> {
        self.dispatched += 1;
        self.in_flight += 1;
        self.max_in_flight = self.max_in_flight.max(self.in_flight);
        self.last_bitmap = Some(bitmap.clone());
        self.pending.push_back((ticket, bitmap));
        Ok(())
    }

    fn poll(&mut self) -> Option<ServiceEvent> {
        let event = self.events.pop_front()?;
        if matches!(event, ServiceEvent::Classified { .. }) {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
        Some(event)
    }

    fn reload(&mut self, model: &ModelConfig) -> Result<(), ClassifierError> {
        self.model = Some(model.clone());
        self.load()
    }
}
