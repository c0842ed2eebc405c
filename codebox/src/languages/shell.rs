use crate::{
    registry::{InstallStrategy, Interpreter, RuntimeRecipe, FILE_PLACEHOLDER},
    types::Language,
};

pub fn recipe() -> RuntimeRecipe {
    RuntimeRecipe {
        language: Language::Shell,
        interpreters: vec![
            Interpreter::new("bash", &[FILE_PLACEHOLDER]),
            Interpreter::new("sh", &[FILE_PLACEHOLDER]),
        ],
        extension: "sh".to_string(),
        install: InstallStrategy::Unsupported,
        threaded: false,
        env: Vec::new(),
    }
}
