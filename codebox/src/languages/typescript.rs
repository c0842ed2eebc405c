use crate::{
    registry::{InstallStrategy, Interpreter, RuntimeRecipe, FILE_PLACEHOLDER},
    types::Language,
};

/// TypeScript runs through a transpiling launcher rather than a `tsc` build
/// step. Candidates are tried in order; the last one needs Node 22.6+.
pub fn recipe() -> RuntimeRecipe {
    RuntimeRecipe {
        language: Language::TypeScript,
        interpreters: vec![
            Interpreter::new("tsx", &[FILE_PLACEHOLDER]),
            Interpreter::new("ts-node", &["--transpile-only", FILE_PLACEHOLDER]),
            Interpreter::new(
                "node",
                &["--experimental-strip-types", "--no-warnings", FILE_PLACEHOLDER],
            )
            .with_min_version(22, 6),
        ],
        extension: "ts".to_string(),
        install: InstallStrategy::Npm,
        threaded: true,
        env: Vec::new(),
    }
}
