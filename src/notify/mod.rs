pub mod relay;
pub mod telegram;
