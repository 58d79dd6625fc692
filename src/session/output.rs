//! Output targets and immutable session configurations
//!
//! The hardware has no notion of adding a single sink to a running session: every
//! transition submits the complete output set. [`SessionConfiguration`] is therefore
//! a value that is built fresh for each transition and never mutated in place.

use crate::errors::ConfigureError;
use crate::hardware::{SinkId, SinkResource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Role of a sink inside a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Preview,
    StillCapture,
    Recording,
}

/// Subsystem responsible for destroying a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkOwner {
    Presentation,
    Controller,
    Encoder,
}

impl OutputKind {
    pub fn owner(&self) -> SinkOwner {
        match self {
            OutputKind::Preview => SinkOwner::Presentation,
            OutputKind::StillCapture => SinkOwner::Controller,
            OutputKind::Recording => SinkOwner::Encoder,
        }
    }

    /// Kinds fed continuously by the repeating request
    pub fn is_streaming(&self) -> bool {
        matches!(self, OutputKind::Preview | OutputKind::Recording)
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Preview => f.write_str("preview"),
            OutputKind::StillCapture => f.write_str("still-capture"),
            OutputKind::Recording => f.write_str("recording"),
        }
    }
}

/// Template of the repeating request armed on a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureIntent {
    Preview,
    StillCapture,
    Record,
}

/// One sink bound into a capture session
#[derive(Debug, Clone)]
pub struct OutputTarget {
    kind: OutputKind,
    sink: Arc<dyn SinkResource>,
}

impl OutputTarget {
    pub fn new(kind: OutputKind, sink: Arc<dyn SinkResource>) -> Self {
        Self { kind, sink }
    }

    pub fn preview(sink: Arc<dyn SinkResource>) -> Self {
        Self::new(OutputKind::Preview, sink)
    }

    pub fn still_capture(sink: Arc<dyn SinkResource>) -> Self {
        Self::new(OutputKind::StillCapture, sink)
    }

    pub fn recording(sink: Arc<dyn SinkResource>) -> Self {
        Self::new(OutputKind::Recording, sink)
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    pub fn sink(&self) -> &Arc<dyn SinkResource> {
        &self.sink
    }

    pub fn sink_id(&self) -> SinkId {
        self.sink.id()
    }

    pub fn owner(&self) -> SinkOwner {
        self.kind.owner()
    }

    /// A target may be carried into the next session only while its sink lives
    pub fn is_reusable(&self) -> bool {
        self.sink.is_valid()
    }
}

/// Complete, immutable output set plus the intent a session is built from
#[derive(Debug, Clone)]
pub struct SessionConfiguration {
    targets: Vec<OutputTarget>,
    intent: CaptureIntent,
}

impl SessionConfiguration {
    pub fn builder() -> SessionConfigurationBuilder {
        SessionConfigurationBuilder::default()
    }

    pub fn targets(&self) -> &[OutputTarget] {
        &self.targets
    }

    pub fn intent(&self) -> CaptureIntent {
        self.intent
    }

    pub fn target(&self, kind: OutputKind) -> Option<&OutputTarget> {
        self.targets.iter().find(|t| t.kind == kind)
    }

    pub fn has(&self, kind: OutputKind) -> bool {
        self.target(kind).is_some()
    }

    pub fn kinds(&self) -> Vec<OutputKind> {
        self.targets.iter().map(|t| t.kind).collect()
    }

    pub fn sink_ids(&self) -> Vec<SinkId> {
        self.targets.iter().map(|t| t.sink_id()).collect()
    }

    /// Sinks the repeating request must keep fed
    pub fn streaming_sinks(&self) -> Vec<SinkId> {
        self.targets
            .iter()
            .filter(|t| t.kind.is_streaming())
            .map(|t| t.sink_id())
            .collect()
    }

    /// Fail on the first target whose sink has been destroyed by its owner
    pub fn ensure_reusable(&self) -> Result<(), ConfigureError> {
        match self.targets.iter().find(|t| !t.is_reusable()) {
            Some(stale) => Err(ConfigureError::InvalidTarget(format!(
                "{} target {} was destroyed by its owner",
                stale.kind,
                stale.sink_id()
            ))),
            None => Ok(()),
        }
    }

    /// Whether both configurations bind the same sinks with the same intent
    pub fn same_outputs(&self, other: &SessionConfiguration) -> bool {
        self.intent == other.intent && self.sink_ids() == other.sink_ids()
    }

    /// A fresh configuration with every target except those of `kind`
    pub fn without(&self, kind: OutputKind) -> Result<SessionConfiguration, ConfigureError> {
        self.rebuild(|t| t.kind != kind)
    }

    /// A fresh configuration keeping only targets whose sinks are still valid
    pub fn retain_reusable(&self) -> Result<SessionConfiguration, ConfigureError> {
        self.rebuild(OutputTarget::is_reusable)
    }

    fn rebuild<F>(&self, keep: F) -> Result<SessionConfiguration, ConfigureError>
    where
        F: Fn(&OutputTarget) -> bool,
    {
        self.targets
            .iter()
            .filter(|t| keep(*t))
            .cloned()
            .fold(SessionConfiguration::builder(), |b, t| b.target(t))
            .build()
    }
}

/// Collects targets for a [`SessionConfiguration`]
#[derive(Debug, Default)]
pub struct SessionConfigurationBuilder {
    targets: Vec<OutputTarget>,
    intent: Option<CaptureIntent>,
}

impl SessionConfigurationBuilder {
    pub fn target(mut self, target: OutputTarget) -> Self {
        self.targets.push(target);
        self
    }

    pub fn intent(mut self, intent: CaptureIntent) -> Self {
        self.intent = Some(intent);
        self
    }

    /// Validate and freeze the output set.
    ///
    /// The intent defaults to `Record` when a recording sink is present and to
    /// `Preview` otherwise.
    pub fn build(mut self) -> Result<SessionConfiguration, ConfigureError> {
        if self.targets.is_empty() {
            return Err(ConfigureError::EmptyConfiguration);
        }

        self.targets.sort_by_key(|t| t.kind);
        for pair in self.targets.windows(2) {
            if pair[0].kind == pair[1].kind {
                return Err(ConfigureError::Rejected(format!(
                    "duplicate {} target",
                    pair[0].kind
                )));
            }
        }

        let intent = self.intent.unwrap_or_else(|| {
            if self.targets.iter().any(|t| t.kind == OutputKind::Recording) {
                CaptureIntent::Record
            } else {
                CaptureIntent::Preview
            }
        });

        Ok(SessionConfiguration {
            targets: self.targets,
            intent,
        })
    }
}

/// Default configuration when no still-capture or recording request is pending:
/// preview, plus the still sink when it is kept warm.
pub fn default_configuration(
    preview: Option<OutputTarget>,
    warm_still: Option<OutputTarget>,
) -> Result<SessionConfiguration, ConfigureError> {
    preview
        .into_iter()
        .chain(warm_still)
        .fold(SessionConfiguration::builder(), |b, t| b.target(t))
        .intent(CaptureIntent::Preview)
        .build()
}

/// Full output set for recording: everything already active plus the recording sink.
///
/// When the device supports fewer than three concurrent outputs the still sink is
/// left out, so photo capture is unavailable until recording stops.
pub fn recording_configuration(
    active: &SessionConfiguration,
    recording: OutputTarget,
    max_concurrent_outputs: u32,
) -> Result<SessionConfiguration, ConfigureError> {
    let keep_still = max_concurrent_outputs >= 3;
    if !keep_still && active.has(OutputKind::StillCapture) {
        log::info!(
            "Device supports {} concurrent outputs; still capture disabled while recording",
            max_concurrent_outputs
        );
    }

    active
        .targets()
        .iter()
        .filter(|t| match t.kind {
            OutputKind::Preview => true,
            OutputKind::StillCapture => keep_still,
            OutputKind::Recording => false,
        })
        .cloned()
        .chain(std::iter::once(recording))
        .fold(SessionConfiguration::builder(), |b, t| b.target(t))
        .intent(CaptureIntent::Record)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimulatedSink;
    use crate::types::Size;

    fn sink() -> Arc<SimulatedSink> {
        SimulatedSink::new(Size::new(640, 480))
    }

    #[test]
    fn test_empty_configuration_is_rejected() {
        assert_eq!(
            SessionConfiguration::builder().build().unwrap_err(),
            ConfigureError::EmptyConfiguration
        );
    }

    #[test]
    fn test_duplicate_kind_is_rejected() {
        let result = SessionConfiguration::builder()
            .target(OutputTarget::preview(sink()))
            .target(OutputTarget::preview(sink()))
            .build();
        assert!(matches!(result, Err(ConfigureError::Rejected(_))));
    }

    #[test]
    fn test_intent_follows_recording_target() {
        let config = SessionConfiguration::builder()
            .target(OutputTarget::recording(sink()))
            .target(OutputTarget::preview(sink()))
            .build()
            .unwrap();
        assert_eq!(config.intent(), CaptureIntent::Record);
        assert_eq!(config.kinds(), vec![OutputKind::Preview, OutputKind::Recording]);
        assert_eq!(config.streaming_sinks().len(), 2);
    }

    #[test]
    fn test_recording_configuration_keeps_active_targets() {
        let active = default_configuration(
            Some(OutputTarget::preview(sink())),
            Some(OutputTarget::still_capture(sink())),
        )
        .unwrap();

        let wide = recording_configuration(&active, OutputTarget::recording(sink()), 3).unwrap();
        assert_eq!(
            wide.kinds(),
            vec![OutputKind::Preview, OutputKind::StillCapture, OutputKind::Recording]
        );

        let narrow = recording_configuration(&active, OutputTarget::recording(sink()), 2).unwrap();
        assert_eq!(narrow.kinds(), vec![OutputKind::Preview, OutputKind::Recording]);
        // the active value is untouched
        assert_eq!(active.kinds(), vec![OutputKind::Preview, OutputKind::StillCapture]);
    }

    #[test]
    fn test_stale_target_is_detected() {
        let preview = sink();
        let config = default_configuration(Some(OutputTarget::preview(preview.clone())), None).unwrap();
        assert!(config.ensure_reusable().is_ok());

        preview.invalidate();
        assert!(matches!(
            config.ensure_reusable(),
            Err(ConfigureError::InvalidTarget(_))
        ));
        assert_eq!(
            config.retain_reusable().unwrap_err(),
            ConfigureError::EmptyConfiguration
        );
    }

    #[test]
    fn test_without_builds_fresh_value() {
        let config = default_configuration(
            Some(OutputTarget::preview(sink())),
            Some(OutputTarget::still_capture(sink())),
        )
        .unwrap();
        let still_only = config.without(OutputKind::Preview).unwrap();
        assert_eq!(still_only.kinds(), vec![OutputKind::StillCapture]);
        assert!(!config.same_outputs(&still_only));
    }
}
