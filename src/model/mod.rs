mod chapter;
mod character;
mod enums;
mod line;
mod llm;
mod media_work;
mod segment;

pub use chapter::{Chapter, Scenario};
pub use character::{Character, CharacterHandle, VoiceProfile};
pub use enums::{CharacterType, Emotion, Gender, LlmRole, SegmentType};
pub use line::Line;
pub use llm::{LlmMessage, LlmResponse, LlmUsage};
pub use media_work::{MediaWork, UNDETERMINED_LANGUAGE};
pub use segment::Segment;
