pub mod context;
pub(crate) mod error_shapes;
pub mod openai_chat;
pub mod openai_responses;
pub mod turns;

/// Outward protocol spoken to the client for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutwardProtocol {
    /// `chat.completion.chunk` deltas terminated by `data: [DONE]`.
    ChatCompletions,
    /// Typed `response.*` events with sequence numbers.
    Responses,
}

impl OutwardProtocol {
    /// Prefix of the response id for this protocol.
    #[must_use]
    pub fn id_prefix(self) -> &'static str {
        match self {
            OutwardProtocol::ChatCompletions => "chatcmpl-",
            OutwardProtocol::Responses => "resp_",
        }
    }
}
