use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum FileExtensionError {
    #[error("Failed to get file extension")]
    MissingFileExtension,
    #[error("Unsupported file extension for file: {0}")]
    UnsupportedFileExtension(String),
}

pub type FileFormatResult<T> = Result<T, FileExtensionError>;

#[derive(Debug, thiserror::Error)]
pub enum SerdeFormatError {
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Extension(#[from] FileExtensionError),
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type SerdeFormatResult<T> = Result<T, SerdeFormatError>;

pub fn get_file_extension(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|os_str| os_str.to_str())
}

/// Text formats accepted for configuration files and descriptors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerdeFormat {
    Yaml,
    Json,
}

impl SerdeFormat {
    pub fn all_formats_for_testing() -> [Self; 2] {
        [Self::Yaml, Self::Json]
    }

    pub fn from_file_name(file_name: &str) -> FileFormatResult<Self> {
        let ext = get_file_extension(file_name).ok_or(FileExtensionError::MissingFileExtension)?;

        if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") {
            Ok(Self::Yaml)
        } else if ext.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else {
            Err(FileExtensionError::UnsupportedFileExtension(
                file_name.to_string(),
            ))
        }
    }

    pub fn serialize<T: Serialize + 'static>(self, value: &T) -> SerdeFormatResult<String> {
        match self {
            Self::Yaml => Ok(serde_yml::to_string(value)?),
            Self::Json => Ok(serde_json::to_string_pretty(value)?),
        }
    }

    pub fn deserialize<T: DeserializeOwned + 'static>(
        self,
        serialized: &str,
    ) -> SerdeFormatResult<T> {
        match self {
            Self::Yaml => Ok(serde_yml::from_str(serialized)?),
            Self::Json => Ok(serde_json::from_str(serialized)?),
        }
    }
}

/// Reads and deserializes a file, picking the format from its extension.
pub fn read_file<T: DeserializeOwned + 'static>(path: &Path) -> SerdeFormatResult<T> {
    let format = SerdeFormat::from_file_name(&path.to_string_lossy())?;
    let text = std::fs::read_to_string(path).map_err(|source| SerdeFormatError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    format.deserialize(&text)
}

/// Serializes a value and writes it to `path`, picking the format from its extension.
pub fn write_file<T: Serialize + 'static>(path: &Path, value: &T) -> SerdeFormatResult<()> {
    let format = SerdeFormat::from_file_name(&path.to_string_lossy())?;
    let text = format.serialize(value)?;
    std::fs::write(path, text).map_err(|source| SerdeFormatError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        sigma: f32,
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            SerdeFormat::from_file_name("finder.YAML").unwrap(),
            SerdeFormat::Yaml
        );
        assert_eq!(
            SerdeFormat::from_file_name("frames.json").unwrap(),
            SerdeFormat::Json
        );
        assert!(matches!(
            SerdeFormat::from_file_name("finder"),
            Err(FileExtensionError::MissingFileExtension)
        ));
        assert!(matches!(
            SerdeFormat::from_file_name("finder.toml"),
            Err(FileExtensionError::UnsupportedFileExtension(_))
        ));
    }

    #[test]
    fn test_text_formats_preserve_values() {
        let sample = Sample {
            name: "W1".to_string(),
            sigma: 2.5,
        };
        for format in SerdeFormat::all_formats_for_testing() {
            let text = format.serialize(&sample).unwrap();
            let parsed: Sample = format.deserialize(&text).unwrap();
            assert_eq!(parsed, sample, "format {:?}", format);
        }
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let result: SerdeFormatResult<Sample> = SerdeFormat::Yaml.deserialize("name: [unclosed");
        assert!(result.is_err());
    }
}
