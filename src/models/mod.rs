pub mod openai;

use crate::error::ServiceError;

/// One blocking completion call. `temperature` 0 asks for the most deterministic output.
pub trait TextGenerator {
    fn generate(&mut self, model: &str, prompt: &str, temperature: f32)
        -> Result<String, ServiceError>;
}
