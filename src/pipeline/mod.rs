//! Pipeline stages for document-to-notes conversion.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ generate ──▶ repair ──▶ render
//! (path/URL) (1 call)   (1 call per   (strict,   (md/json/docx)
//!                        section)     then scan)
//! ```
//!
//! 1. [`input`]    canonicalise the user-supplied path or URL, enforce the
//!    size limit and detect PDF vs. DOCX
//! 2. [`extract`]  one document-level model call returning headings and bodies
//! 3. [`generate`] one model call per section, order preserved, per-section
//!    failures recorded instead of raised
//! 4. [`repair`]   turn raw responses into validated note records
//! 5. [`render`]   map records to Markdown, JSON or a Word document
//!
//! [`llm`] is the seam between the stages and the model provider.

pub mod extract;
pub mod generate;
pub mod input;
pub mod llm;
pub mod render;
pub mod repair;

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted [`LanguageModel`] for unit tests.

    use super::llm::{LanguageModel, ModelError, ModelReply, ModelRequest};
    use crate::output::TokenUsage;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    type Script = Box<dyn Fn(&ModelRequest<'_>) -> Result<String, String> + Send + Sync>;

    /// Answers every call through a closure and records the prompts it saw.
    pub struct ScriptedModel {
        script: Script,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new<F>(script: F) -> Self
        where
            F: Fn(&ModelRequest<'_>) -> Result<String, String> + Send + Sync + 'static,
        {
            Self {
                script: Box::new(script),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Always reply with the same text.
        pub fn fixed(text: &str) -> Self {
            let text = text.to_string();
            Self::new(move |_| Ok(text.clone()))
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl LanguageModel for ScriptedModel {
        fn complete<'a>(
            &'a self,
            request: ModelRequest<'a>,
        ) -> BoxFuture<'a, Result<ModelReply, ModelError>> {
            self.prompts.lock().unwrap().push(request.prompt.to_string());
            let result = (self.script)(&request);
            Box::pin(async move {
                result
                    .map(|text| ModelReply {
                        usage: TokenUsage {
                            input_tokens: 10,
                            output_tokens: text.len(),
                        },
                        text,
                    })
                    .map_err(ModelError::new)
            })
        }
    }
}
