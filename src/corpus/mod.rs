//! @ai:module:intent Test cases, prompt variants and their read-only registries
//! @ai:module:layer domain
//! @ai:module:public_api TestCase, CaseStore, PromptVariant, VariantRegistry, Registry, CaseDirLoader

pub mod case;
pub mod loader;
pub mod registry;
pub mod variant;

pub use case::{CaseStore, TestCase};
pub use loader::CaseDirLoader;
pub use registry::{Keyed, Registry};
pub use variant::{PromptVariant, TemplateError, VariantRegistry, ORIGIN_BASELINE, ORIGIN_OPTIMIZED};
