//! The five pipeline stages and their fixed ordering.

mod alert;
mod classify;
mod context;
mod research;
mod synthesis;

pub use alert::{evaluate_alerts, AlertStage};
pub use classify::ClassifyStage;
pub use context::ContextStage;
pub use research::{derive_queries, ResearchStage};
pub use synthesis::SynthesisStage;

use super::stage::Stage;

/// Ordered composition of stages. Order here is the trace order.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Context → Research → Contradiction/Confirmation → Synthesis → Alert.
    pub fn standard() -> Self {
        Self {
            stages: vec![
                Box::new(ContextStage),
                Box::new(ResearchStage),
                Box::new(ClassifyStage),
                Box::new(SynthesisStage),
                Box::new(AlertStage),
            ],
        }
    }

    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}
