pub mod catalog;
pub mod engine;
pub mod host_control;
pub mod parser;
pub mod path;
pub mod registry;
pub mod resolution;
pub mod runner;

pub use engine::PlaybookEngineService;
pub use parser::parse_playbook_yaml;
pub use resolution::resolve;
pub use runner::PlaybookRunner;
