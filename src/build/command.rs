//! Compiler command construction.

use std::path::Path;

use crate::build::process::ToolInvocation;
use crate::paths::NormalizedPath;
use crate::project::{owning_root, ProjectConfig, ScriptUnit};

/// One compiler invocation for one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCommand {
    /// Script being compiled
    pub script: ScriptUnit,
    /// Process to run
    pub invocation: ToolInvocation,
}

impl CompileCommand {
    /// Build the command compiling `script` under `config`.
    ///
    /// Each command gets its own pruned import list; nothing shared is
    /// mutated, so commands may be built in any order or concurrently.
    pub fn for_script(config: &ProjectConfig, script: &ScriptUnit) -> Self {
        let imports = pruned_imports(&config.imports, script);
        let import_arg = imports
            .iter()
            .map(|i| i.as_path().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(";");

        let mut invocation = ToolInvocation::new(&config.compiler_path)
            .arg(script.object_name.as_str())
            .arg(format!("-o={}", config.output_path.display()))
            .arg(format!("-i={}", import_arg))
            .arg(format!("-f={}", config.flags))
            .with_working_dir(config.project_dir.as_path());

        if config.optimize {
            invocation = invocation.arg("-op");
        }
        if config.game.namespaced() {
            if config.release {
                invocation = invocation.arg("-release");
            }
            if config.final_build {
                invocation = invocation.arg("-final");
            }
        }

        Self { script: script.clone(), invocation }
    }

    /// Object name of the compiled script.
    pub fn object_name(&self) -> &str {
        &self.script.object_name
    }
}

/// Import roots to pass when compiling `script`.
///
/// A root listed before the script's owning root is dropped when it holds a
/// different file under the same object name, since the compiler would pick
/// that file instead. The owning root and the script's own directory are
/// always kept.
pub fn pruned_imports(imports: &[NormalizedPath], script: &ScriptUnit) -> Vec<NormalizedPath> {
    let Some(owner) = owning_root(imports, &script.source) else {
        return imports.to_vec();
    };
    let owner_index = imports.iter().position(|i| i == owner).unwrap_or(imports.len());
    let own_dir = script.source.parent();

    imports
        .iter()
        .enumerate()
        .filter(|(index, root)| {
            if *index >= owner_index || Some(root.as_path()) == own_dir {
                return true;
            }
            !shadows(root, &script.object_name, &script.source)
        })
        .map(|(_, root)| root.clone())
        .collect()
}

fn shadows(root: &NormalizedPath, object_name: &str, source: &Path) -> bool {
    let candidate = root.join(object_name);
    candidate.as_path().is_file() && candidate.as_path() != source
}
