// src/persist.rs
// Saves an equation as plain text and reads it back. The text is exactly the Display output of
// SymMatrix, with no header or versioning.

use std::fs;
use std::path::Path;

use log::info;

use crate::error::Result;
use crate::matrix::SymMatrix;

/// Writes `eq` to `path`, overwriting any existing file. Returns the number of bytes written.
pub fn save_equation(path: impl AsRef<Path>, eq: &SymMatrix) -> Result<usize> {
    let path = path.as_ref();
    let text = eq.to_string();
    fs::write(path, &text)?;
    info!("Saved equation to {} ({} bytes)", path.display(), text.len());
    Ok(text.len())
}

/// Reads an equation written by [`save_equation`].
pub fn load_equation(path: impl AsRef<Path>) -> Result<SymMatrix> {
    let path = path.as_ref();
    info!("Loading sliderbot dynamics from {}", path.display());
    let text = fs::read_to_string(path)?;
    Ok(text.trim().parse::<SymMatrix>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::expr::{cos, num, sym};
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sliderbot-{}-{}", std::process::id(), name))
    }

    #[test]
    fn single_entry_round_trip() {
        let path = temp_path("scalar.txt");
        let e = sym("a") * cos(sym("phi")) / (num(2.0) + sym("b"));
        let eq = SymMatrix::column(vec![e]);
        let written = save_equation(&path, &eq).unwrap();
        assert_eq!(written, eq.to_string().len());
        let loaded = load_equation(&path).unwrap();
        assert_eq!(loaded.expand(), eq.expand());
        fs::remove_file(path).ok();
    }

    #[test]
    fn save_overwrites() {
        let path = temp_path("overwrite.txt");
        save_equation(&path, &SymMatrix::symbols(&["a_long_symbol_name", "c"])).unwrap();
        save_equation(&path, &SymMatrix::symbols(&["b"])).unwrap();
        let loaded = load_equation(&path).unwrap();
        assert_eq!(loaded, SymMatrix::symbols(&["b"]));
        fs::remove_file(path).ok();
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let path = temp_path("garbage.txt");
        fs::write(&path, "Matrix([[phi +]])").unwrap();
        assert!(matches!(load_equation(&path), Err(Error::Parse(_))));
        fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            load_equation(temp_path("does-not-exist.txt")),
            Err(Error::Io(_))
        ));
    }
}
