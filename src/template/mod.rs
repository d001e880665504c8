//! Script templating for ecfjob.
//!
//! Two processors run at different times:
//!
//! - **Deploy**: `<?expr?>`, `<!stmts!>` and `<&file&>` blocks are rendered
//!   once when the suite is deployed, with values from the deploy config.
//! - **ecFlow**: `%VAR%` references and `%include` directives are expanded
//!   when a job is generated, with the task's variables.
//!
//! Both share the include lookup in [`IncludePath`].

pub mod deploy;
pub mod ecflow;
mod error;
mod includes;

pub use deploy::DeployTemplate;
pub use ecflow::Preprocessor;
pub use error::TemplateError;
pub use includes::IncludePath;
