use crate::classification::classification_enum;

classification_enum! {
    /// How a piece of a line is voiced.
    pub enum SegmentType {
        Narration => "narration",
        Dialogue => "dialogue",
        Highlight => "highlight",
    }
    default = Narration;
}

classification_enum! {
    pub enum CharacterType {
        Unknown => "unknown",
        Narrator => "narrator",
        Protagonist => "protagonist",
        SupportingMale => "supporting_male",
        SupportingFemale => "supporting_female",
        System => "system",
    }
    default = Unknown;
}

classification_enum! {
    pub enum Gender {
        Male => "male",
        Female => "female",
        Unknown => "unknown",
    }
    default = Unknown;
}

classification_enum! {
    pub enum Emotion {
        Neutral => "neutral",
        Joy => "joy",
        Anger => "anger",
        Surprise => "surprise",
        Hesitation => "hesitation",
        Shout => "shout",
    }
    default = Neutral;
}

classification_enum! {
    /// Chat message author.
    pub enum LlmRole {
        System => "system",
        User => "user",
        Assistant => "assistant",
        Function => "function",
    }
    default = User;
}
