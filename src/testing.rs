//! Scripted classifier and recording reporter shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use persona_dedup_core::classifier::Classifier;
use persona_dedup_core::models::{Citation, Classification, NamePairRecord, Verdict};

use crate::progress::{ProgressEvent, ProgressReporter};

/// One scripted reply.
#[derive(Clone, Debug)]
pub enum Reply {
    Verdict(Verdict),
    Cited(Verdict, Vec<(&'static str, &'static str)>),
    Fail,
}

/// Replays a fixed script per call; once the script runs out, `fallback`
/// is returned for every further call.
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<usize>>,
}

impl ScriptedClassifier {
    pub fn new(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self::new(Vec::new(), reply)
    }

    /// Record indices in call order.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn classify(&self, pair: &NamePairRecord) -> Result<Classification> {
        self.calls.lock().unwrap().push(pair.index);
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            Reply::Verdict(v) => Ok(Classification::new(v, Vec::new())),
            Reply::Cited(v, cites) => Ok(Classification::new(
                v,
                cites
                    .into_iter()
                    .filter_map(|(uri, title)| Citation::new(uri, title))
                    .collect(),
            )),
            Reply::Fail => anyhow::bail!("connection reset"),
        }
    }
}

/// Keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn records(names: &[(&str, &str)]) -> Vec<NamePairRecord> {
    names
        .iter()
        .enumerate()
        .map(|(i, (a, b))| NamePairRecord::new(i, *a, *b))
        .collect()
}
