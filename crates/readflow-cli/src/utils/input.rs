//! Reading the text to process.

use std::io::Read;
use std::path::Path;

use crate::error::CliError;

/// Read `path`, or stdin when it is `None` or `-`.
pub fn read_text(path: Option<&Path>) -> Result<String, CliError> {
    let text = match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| CliError::Io(format!("stdin: {e}")))?;
            buf
        }
    };

    if text.trim().is_empty() {
        let source = path.map_or_else(|| "stdin".to_owned(), |p| p.display().to_string());
        return Err(CliError::EmptyInput(source));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn reads_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Hello there. General Kenobi.").unwrap();

        let text = read_text(Some(file.path())).unwrap();
        assert!(text.starts_with("Hello there."));
    }

    #[test]
    fn blank_file_is_empty_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "   ").unwrap();

        assert!(matches!(
            read_text(Some(file.path())),
            Err(CliError::EmptyInput(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        assert!(matches!(read_text(Some(&missing)), Err(CliError::Io(_))));
    }
}
