/// Per-request counters shared by the outward emitters.
///
/// One context exists per request and is handed by `&mut` to emitter
/// operations only. Every outward event takes exactly one sequence number,
/// so the numbers a client sees are contiguous from zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionContext {
    response_id: String,
    created_at: u64,
    model: String,
    sequence_number: u64,
    output_index: usize,
    content_index: usize,
    tool_call_slot_index: usize,
}

impl ConversionContext {
    #[must_use]
    pub fn new(response_id: impl Into<String>, model: impl Into<String>, created_at: u64) -> Self {
        Self {
            response_id: response_id.into(),
            created_at,
            model: model.into(),
            sequence_number: 0,
            output_index: 0,
            content_index: 0,
            tool_call_slot_index: 0,
        }
    }

    #[must_use]
    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of sequence numbers handed out so far.
    #[must_use]
    pub fn events_emitted(&self) -> u64 {
        self.sequence_number
    }

    /// Number of tool-call slots assigned so far.
    #[must_use]
    pub fn tool_calls_assigned(&self) -> usize {
        self.tool_call_slot_index
    }

    /// Take the next sequence number.
    pub fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence_number;
        self.sequence_number += 1;
        seq
    }

    /// Take the next output item index. Resets the content index, since
    /// content parts are numbered per item.
    pub fn next_output_index(&mut self) -> usize {
        let index = self.output_index;
        self.output_index += 1;
        self.content_index = 0;
        index
    }

    /// Take the next content part index within the current output item.
    pub fn next_content_index(&mut self) -> usize {
        let index = self.content_index;
        self.content_index += 1;
        index
    }

    /// Take the next tool-call slot.
    pub fn next_tool_call_slot(&mut self) -> usize {
        let slot = self.tool_call_slot_index;
        self.tool_call_slot_index += 1;
        slot
    }
}
