use crate::config::{LabelsConfig, Validatable};
use detect_proto::ColorLabel;
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

pub trait State: Send + Sync + 'static {
    fn new(labels_cfg: &LabelsConfig) -> Result<Self, String>
    where
        Self: Sized;
    fn get_labels(&self) -> &Vec<ColorLabel>;
}

#[derive(Debug)]
pub struct ServiceState {
    class_labels: Vec<ColorLabel>,
}

impl State for ServiceState {
    fn new(labels_cfg: &LabelsConfig) -> Result<ServiceState, String> {
        match load_color_labels(&labels_cfg.get_path()) {
            Ok(labels) => {
                tracing::info!("Loaded {} class labels", labels.len());
                Ok(ServiceState {
                    class_labels: labels,
                })
            }
            Err(e) => Err(format!("Failed to load labels: {}", e)),
        }
    }

    fn get_labels(&self) -> &Vec<ColorLabel> {
        &self.class_labels
    }
}

fn parse_channel(value: &str, channel: &str) -> io::Result<u32> {
    let parsed: u32 = value.trim().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid {} value: {}", channel, value.trim()),
        )
    })?;
    if parsed > 255 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} value out of range: {}", channel, parsed),
        ));
    }
    Ok(parsed)
}

/// Reads `label,red,green,blue` lines. Blank lines are skipped; the line
/// index is the class id.
pub fn load_color_labels(filepath: &Path) -> io::Result<Vec<ColorLabel>> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut color_labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        // Labels may contain commas, so the colors are taken from the right.
        let parts: Vec<&str> = line.rsplitn(4, ',').collect();

        if parts.len() == 4 {
            let blue = parse_channel(parts[0], "blue")?;
            let green = parse_channel(parts[1], "green")?;
            let red = parse_channel(parts[2], "red")?;
            let label = parts[3].trim().to_string();

            color_labels.push(ColorLabel {
                label,
                red,
                green,
                blue,
            });
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid line format: {}", line),
            ));
        }
    }

    Ok(color_labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn labels_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_color_labels() {
        let file = labels_file("person,230,45,46\n\ntraffic light, 10, 20, 30\n");

        let labels = load_color_labels(file.path()).unwrap();

        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].label, "person");
        assert_eq!(labels[0].red, 230);
        assert_eq!(labels[1].label, "traffic light");
        assert_eq!(labels[1].blue, 30);
    }

    #[test]
    fn test_load_color_labels_rejects_bad_lines() {
        let file = labels_file("person,230,45\n");
        assert!(load_color_labels(file.path()).is_err());

        let file = labels_file("person,230,45,300\n");
        assert!(load_color_labels(file.path()).is_err());
    }

    #[test]
    fn test_service_state_from_config() {
        let file = labels_file("cat,1,2,3\ndog,4,5,6\n");
        let path = file.path();
        let cfg = LabelsConfig {
            labels_file: path.file_name().unwrap().to_string_lossy().to_string(),
            labels_dir: path.parent().unwrap().to_path_buf(),
        };

        let state = ServiceState::new(&cfg).unwrap();

        assert_eq!(state.get_labels().len(), 2);
        assert_eq!(state.get_labels()[1].label, "dog");
    }
}
