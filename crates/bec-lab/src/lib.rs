//! Lab-side collaborators of a tuning run.
//!
//! A [`TrialRunner`] composes a [`Dispatcher`] (send parameters to the
//! apparatus), a [`CompletionSignal`] (wait for the analysis pipeline), a
//! [`ResultExtractor`] (read the measurement) and a [`Scorer`] into one
//! evaluation of the optimizer's objective.

pub mod completion;
pub mod dispatcher;
pub mod extractor;
pub mod runner;
pub mod scorer;

pub use completion::{CompletionSignal, FreshArtifactSignal, ImmediateSignal, MarkerFileSignal};
pub use dispatcher::{
    CommandDispatcher, DispatchRequest, Dispatcher, JsonFileDispatcher, TraceDispatcher,
};
pub use extractor::{LabeledFieldExtractor, ResultExtractor};
pub use runner::{FailurePolicy, RunnerSettings, TrialRunner};
pub use scorer::{LinearScorer, LogAtomScorer, Scorer};
