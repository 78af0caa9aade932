//! Candidates printed for a line ending in `?`.

use crate::command::BuiltinTable;
use crate::env::Environment;
use crate::resolve::is_executable;
use crate::stage::Stage;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Completions for the word being typed at the end of `chain`.
///
/// When the last stage has only its program word, builtins and `PATH`
/// executables are offered; otherwise file names relative to the current
/// directory. Results are sorted and unique.
pub fn candidates(chain: &Stage, builtins: &BuiltinTable, env: &Environment) -> Vec<String> {
    let stage = chain.last();
    match stage.arguments.len() {
        0 | 1 => commands(&stage.program_name, builtins, env),
        _ => {
            let word = stage.arguments.last().map(String::as_str).unwrap_or_default();
            files(word, env)
        }
    }
}

/// Builtin names and executables from every `PATH` directory starting with `prefix`.
pub fn commands(prefix: &str, builtins: &BuiltinTable, env: &Environment) -> Vec<String> {
    let mut found: BTreeSet<String> = builtins
        .names()
        .filter(|name| name.starts_with(prefix))
        .map(str::to_string)
        .collect();

    for dir in env.search_path().split(':').filter(|dir| !dir.is_empty()) {
        let Ok(entries) = fs::read_dir(dir) else {
            debug!(dir, "skipping unreadable PATH entry");
            continue;
        };
        for entry in entries.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(prefix) && is_executable(&entry.path()) {
                found.insert(name);
            }
        }
    }
    found.into_iter().collect()
}

/// Paths starting with `word`. Directories get a trailing `/`; dot files are
/// only listed when the typed name starts with a dot.
pub fn files(word: &str, env: &Environment) -> Vec<String> {
    let (dir_part, name_prefix) = match word.rfind('/') {
        Some(slash) => word.split_at(slash + 1),
        None => ("", word),
    };
    let dir = if dir_part.is_empty() {
        env.current_dir.clone()
    } else {
        env.current_dir.join(Path::new(dir_part))
    };

    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut found = BTreeSet::new();
    for entry in entries.flatten() {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.starts_with(name_prefix) || (name.starts_with('.') && !name_prefix.starts_with('.'))
        {
            continue;
        }
        let suffix = if entry.path().is_dir() { "/" } else { "" };
        found.insert(format!("{}{}{}", dir_part, name, suffix));
    }
    found.into_iter().collect()
}
