// Reply Splitter Core Services

pub mod text_processor;
pub mod config_store;
pub mod tts_provider;
pub mod segmentation;
pub mod delivery;

pub use text_processor::*;
pub use config_store::*;
pub use tts_provider::{HttpSpeechSynthesizer, SynthesisError};

pub use segmentation::{
    assemble_segments,
    limit_segments,
    plan_segments,
    Delimiter,
    NestingTable,
    PacingModel,
    Placement,
    PlacementTable,
    Tokenizer,
};

pub use delivery::{
    substitute_speech,
    HostSpeechSettings,
    MessageSender,
    ReplySplitter,
    SpeechPolicy,
    SpeechSynthesizer,
};
