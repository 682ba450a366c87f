use crate::raster::Bitmap;

/// Outcome of one round
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub snapshot: Option<Bitmap>,
    pub guessed: Option<String>,
    pub target: String,
    pub correct: bool,
}

/// Append-only history of the rounds in a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundLedger {
    records: Vec<PredictionRecord>,
}

impl RoundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: PredictionRecord) {
        self.records.push(record);
    }

    /// `(correct, total)`
    pub fn score(&self) -> (usize, usize) {
        let correct = self.records.iter().filter(|r| r.correct).count();
        (correct, self.records.len())
    }

    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &PredictionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}
