/// Information about a sink for monitoring/debugging
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkMetadata {
    /// Human-readable sink name
    pub name: String,

    /// Sink type (csv-file, collector, etc.)
    pub sink_type: String,

    /// Backing location if applicable
    pub endpoint: Option<String>,

    /// Whether the sink still accepts records
    pub state: SinkState,

    /// Records durably appended
    pub records_written: u64,

    /// Appends that returned an error
    pub records_failed: u64,

    /// Last error if any
    pub last_error: Option<String>,
}

impl SinkMetadata {
    /// Create new metadata with name and type
    pub fn new(name: impl Into<String>, sink_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sink_type: sink_type.into(),
            ..Self::default()
        }
    }

    /// Set endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set sink state
    pub fn with_state(mut self, state: SinkState) -> Self {
        self.state = state;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkState {
    #[default]
    Open,
    Closed,
}
