/// Precondition violations raised before a trial creates any state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SprError {
    /// The sentence contained nothing but whitespace.
    #[error("sentence is empty after trimming")]
    EmptySentence,

    /// The advance key spec did not name exactly one input token.
    #[error("invalid advance key: {0:?}")]
    InvalidAdvanceKey(String),

    /// A rating scale needs at least two points and fits the digit keys.
    #[error("invalid rating scale: {0}")]
    InvalidScale(u8),
}
