use crate::board::Board;
use crate::deadlocks::DeadlockMask;
use crate::grid::Grid;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::{fmt, fs, io};

/// Error type for level loading.
#[derive(Debug)]
pub enum LevelError {
    /// IO error when reading from file
    Io(io::Error),
    /// Invalid level content
    InvalidLevel(String),
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelError::Io(err) => write!(f, "IO error: {}", err),
            LevelError::InvalidLevel(msg) => write!(f, "Invalid level: {}", msg),
        }
    }
}

impl From<io::Error> for LevelError {
    fn from(err: io::Error) -> Self {
        LevelError::Io(err)
    }
}

impl From<String> for LevelError {
    fn from(err: String) -> Self {
        LevelError::InvalidLevel(err)
    }
}

/// Levels live one per file as `level_<id>.txt` inside a named folder.
pub fn level_path(folder: &str, level_id: usize) -> PathBuf {
    Path::new(folder).join(format!("level_{}.txt", level_id))
}

/// Read and parse a level file into its normalised grid.
pub fn load_grid(folder: &str, level_id: usize) -> Result<Grid, LevelError> {
    let contents = fs::read_to_string(level_path(folder, level_id))?;
    Ok(Board::parse(contents.trim_end_matches('\n'))?)
}

/// Load a level and build its root board around the shared live-square mask.
pub fn load(
    folder: &str,
    level_id: usize,
    max_steps: usize,
    deadlocks: Rc<DeadlockMask>,
) -> Result<Board, LevelError> {
    let grid = load_grid(folder, level_id)?;
    Ok(Board::from_grid(grid, max_steps, deadlocks))
}

/// Number of `level_<n>.txt` files in a folder.
pub fn count_levels(folder: &str) -> Result<usize, LevelError> {
    let mut count = 0;
    for entry in fs::read_dir(folder)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("level_") && name.ends_with(".txt") {
            count += 1;
        }
    }
    Ok(count)
}
