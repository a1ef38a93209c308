//! # Tool Path Resolver
//!
//! This module handles finding the external video tools (ffmpeg, ffprobe)
//! in different environments:
//! - Explicit paths from the configuration
//! - `MEDIA_COMPRESSOR_TOOLS_DIR` environment override
//! - Tools bundled next to the executable
//! - System-installed tools on `PATH`

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable pointing at a directory of bundled tools
pub const TOOLS_DIR_ENV: &str = "MEDIA_COMPRESSOR_TOOLS_DIR";

/// Tool path resolver for different deployment environments
#[derive(Debug, Clone)]
pub struct ToolPathResolver {
    /// Base directory where tools are bundled
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Create a new path resolver
    pub fn new() -> Self {
        Self {
            tools_dir: Self::detect_bundled_tools_dir(),
        }
    }

    /// Resolver rooted at an explicit tools directory
    pub fn with_tools_dir(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: Some(tools_dir.into()),
        }
    }

    /// Detect the bundled tools directory
    fn detect_bundled_tools_dir() -> Option<PathBuf> {
        // Strategy 1: direct override
        if let Ok(tools_dir) = env::var(TOOLS_DIR_ENV) {
            let tools_path = PathBuf::from(tools_dir);
            debug!("Checking {} environment variable: {:?}", TOOLS_DIR_ENV, tools_path);
            if tools_path.is_dir() {
                return Some(tools_path);
            }
        }

        // Strategy 2: tools shipped next to the executable
        if let Ok(exe_path) = env::current_exe() {
            if let Some(app_dir) = exe_path.parent() {
                let possible_paths = [
                    app_dir.join("tools"),
                    app_dir.join("resources").join("tools"),
                ];

                for path in &possible_paths {
                    debug!("Checking bundled path: {:?}", path);
                    if path.is_dir() {
                        debug!("Found bundled tools directory: {:?}", path);
                        return Some(path.clone());
                    }
                }
            }
        }

        debug!("No bundled tools directory found");
        None
    }

    /// Resolve the path to a specific tool, bundled first then `PATH`
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        if let Some(ref tools_dir) = self.tools_dir {
            if let Some(bundled_path) = Self::bundled_tool_path(tools_dir, tool_name) {
                debug!("Using bundled tool: {} -> {:?}", tool_name, bundled_path);
                return Some(bundled_path);
            }
        }

        if let Some(system_path) = Self::find_in_system_path(tool_name) {
            debug!("Using system tool: {} -> {:?}", tool_name, system_path);
            return Some(system_path);
        }

        warn!("Tool not found: {}", tool_name);
        None
    }

    /// Resolve a tool honouring an explicit configured path first
    pub fn resolve_with_override(&self, tool_name: &str, explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Some(path.to_path_buf());
            }
            warn!("Configured {} path does not exist: {:?}", tool_name, path);
        }
        self.resolve_tool(tool_name)
    }

    /// Look for `tools/{tool}` then `tools/{platform}/{tool}`
    fn bundled_tool_path(tools_dir: &Path, tool_name: &str) -> Option<PathBuf> {
        let file_name = Self::executable_name(tool_name);
        let platform = if cfg!(target_os = "macos") {
            "darwin"
        } else {
            env::consts::OS
        };

        [tools_dir.join(&file_name), tools_dir.join(platform).join(&file_name)]
            .into_iter()
            .find(|path| path.is_file())
    }

    /// Find tool in system PATH
    fn find_in_system_path(tool_name: &str) -> Option<PathBuf> {
        let file_name = Self::executable_name(tool_name);
        let paths = env::var_os("PATH")?;

        env::split_paths(&paths)
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
    }

    fn executable_name(tool_name: &str) -> String {
        if cfg!(windows) {
            format!("{}.exe", tool_name)
        } else {
            tool_name.to_string()
        }
    }

    /// Get path to ffmpeg tool
    pub fn ffmpeg(&self) -> Option<PathBuf> {
        self.resolve_tool("ffmpeg")
    }

    /// Get path to ffprobe tool
    pub fn ffprobe(&self) -> Option<PathBuf> {
        self.resolve_tool("ffprobe")
    }
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}
