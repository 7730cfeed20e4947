use crate::api::Detection;

/// One entry of the detection list. `detection` indexes the full prediction
/// list, also when the card is shown in a filtered list.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub detection: usize,
    pub title: String,
    pub confidence_text: String,
    pub coordinates_text: String,
}

impl Card {
    pub fn new(index: usize, detection: &Detection) -> Self {
        let c = &detection.coordinates;
        Self {
            detection: index,
            title: detection.class_name.clone(),
            confidence_text: format!("Confidence: {}%", detection.confidence),
            coordinates_text: format!("Coordinates: ({}, {}) - ({}, {})", c.x1, c.y1, c.x2, c.y2),
        }
    }
}

pub fn cards_for(predictions: &[Detection]) -> Vec<Card> {
    predictions
        .iter()
        .enumerate()
        .map(|(index, detection)| Card::new(index, detection))
        .collect()
}

/// Cards for the detections whose class equals `class_name` exactly.
pub fn filter_by_class(predictions: &[Detection], class_name: &str) -> Vec<Card> {
    predictions
        .iter()
        .enumerate()
        .filter(|(_, detection)| detection.class_name == class_name)
        .map(|(index, detection)| Card::new(index, detection))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Coordinates;

    fn detection(class_name: &str, confidence: f64) -> Detection {
        Detection {
            class_name: class_name.to_string(),
            confidence,
            coordinates: Coordinates {
                x1: 10.0,
                y1: 10.0,
                x2: 50.0,
                y2: 60.0,
            },
        }
    }

    #[test]
    fn test_card_text() {
        let card = Card::new(0, &detection("cat", 91.0));

        assert_eq!(card.title, "cat");
        assert_eq!(card.confidence_text, "Confidence: 91%");
        assert_eq!(card.coordinates_text, "Coordinates: (10, 10) - (50, 60)");
    }

    #[test]
    fn test_filter_keeps_full_list_indices() {
        let predictions = vec![
            detection("dog", 80.0),
            detection("cat", 91.0),
            detection("dog", 70.0),
        ];

        let cards = filter_by_class(&predictions, "dog");

        assert_eq!(
            cards.iter().map(|c| c.detection).collect::<Vec<_>>(),
            vec![0, 2]
        );
    }

    #[test]
    fn test_filter_is_exact_match() {
        let predictions = vec![detection("Cat", 91.0), detection("cat ", 90.0)];

        assert!(filter_by_class(&predictions, "cat").is_empty());
    }
}
