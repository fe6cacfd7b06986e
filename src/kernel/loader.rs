//! Load prompt functions and plugins from directories.
//!
//! A function directory holds `skprompt.txt` and optionally `config.json`.
//! A plugin directory is either a function directory itself or a directory
//! whose function subdirectories become the plugin's functions.

use crate::error::{KernelError, Result};
use crate::kernel::plugin::{KernelFunction, KernelPlugin, PromptFunction};
use crate::kernel::prompt_config::PromptConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const PROMPT_FILE: &str = "skprompt.txt";
pub const CONFIG_FILE: &str = "config.json";

pub fn is_function_dir(path: &Path) -> bool {
    path.join(PROMPT_FILE).is_file()
}

/// True when `path` is a function directory or has function subdirectories.
pub fn is_plugin_dir(path: &Path) -> bool {
    is_function_dir(path)
        || sorted_subdirs(path)
            .map(|dirs| dirs.iter().any(|d| is_function_dir(d)))
            .unwrap_or(false)
}

/// Immediate subdirectories in name order.
pub fn sorted_subdirs(path: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .ok_or_else(|| {
            KernelError::PluginError(format!("Cannot derive a name from {}", path.display()))
        })
}

/// Load the prompt function in `path`, named after the directory.
pub fn load_function_dir(path: &Path) -> Result<PromptFunction> {
    let template = std::fs::read_to_string(path.join(PROMPT_FILE)).map_err(|e| {
        KernelError::PluginError(format!("Cannot read {} in {}: {}", PROMPT_FILE, path.display(), e))
    })?;

    let config_path = path.join(CONFIG_FILE);
    let config = if config_path.is_file() {
        PromptConfig::load(&config_path)?
    } else {
        PromptConfig::default()
    };

    PromptFunction::new(dir_name(path)?, &template, config)
}

/// Load the plugin in `path`, named after the directory.
pub fn load_plugin_dir(path: &Path) -> Result<KernelPlugin> {
    let name = dir_name(path)?;

    if is_function_dir(path) {
        let function = load_function_dir(path)?;
        let mut plugin = KernelPlugin::new(&name, function.description())?;
        plugin.add_function(function.name().to_string(), KernelFunction::Prompt(function))?;
        info!(plugin = %name, "Loaded single-function plugin");
        return Ok(plugin);
    }

    let mut plugin = KernelPlugin::new(&name, "")?;
    for dir in sorted_subdirs(path)? {
        if !is_function_dir(&dir) {
            debug!(dir = %dir.display(), "Skipping directory without {}", PROMPT_FILE);
            continue;
        }
        let function = load_function_dir(&dir)?;
        plugin.add_function(function.name().to_string(), KernelFunction::Prompt(function))?;
    }

    if plugin.is_empty() {
        return Err(KernelError::PluginError(format!(
            "No prompt functions found in {}",
            path.display()
        )));
    }

    info!(plugin = %name, functions = plugin.len(), "Loaded plugin");
    Ok(plugin)
}
