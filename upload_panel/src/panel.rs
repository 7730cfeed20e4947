//! The Upload & Annotate Panel as a state machine.
//!
//! Every UI action is a [`PanelEvent`]. [`Panel::handle`] applies it to the
//! panel-local state and returns the [`PanelEffect`]s the page has to perform.
//! Nothing here touches the DOM or the network, so the whole interaction can
//! be driven from tests.

use crate::{
    api::{ApiError, Detection, PredictionResponse},
    cards::{cards_for, filter_by_class, Card},
    geometry::{overlay_for, ImageMetrics, OverlayBox},
    upload::{validate_file, SelectedFile, UploadTicket, UploadTracker},
};
use std::collections::BTreeSet;

pub const NOT_AN_IMAGE_ALERT: &str = "Please upload an image";
pub const PROCESSING_FAILED_ALERT: &str = "An error occurred while processing the image";

#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    DragOver,
    DragLeave,
    /// A drop on the drop zone, with the first dropped file if there was one.
    Dropped(Option<SelectedFile>),
    DropZoneClicked,
    FilePicked(SelectedFile),
    UploadSettled {
        ticket: UploadTicket,
        outcome: Result<PredictionResponse, ApiError>,
    },
    /// The original image finished loading; `container_width` is the rendered
    /// width of its container.
    OriginalImageLoaded { container_width: f64 },
    CardClicked {
        detection: usize,
        image: ImageMetrics,
    },
    BadgeClicked { class_name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelEffect {
    HighlightDropZone(bool),
    OpenFilePicker,
    Alert(String),
    LogError(String),
    ShowLoading,
    HideLoading,
    /// POST the file that triggered this event to `/predict`.
    SubmitUpload(UploadTicket),
    AbortUpload(UploadTicket),
    ShowImages {
        original_url: String,
        marked_url: String,
    },
    SetMarkedContainerWidth(f64),
    ClearOverlay,
    /// Replaces any overlay on the page.
    DrawOverlay(OverlayBox),
    /// Replaces the whole card list.
    RenderCards(Vec<Card>),
    /// Marks the card of this detection active and every other card inactive.
    ActivateCard(usize),
    ShowChart(String),
    SetBadgeActive { class_name: String, active: bool },
}

#[derive(Debug, Default)]
pub struct Panel {
    predictions: Vec<Detection>,
    cards: Vec<Card>,
    active_card: Option<usize>,
    overlay: Option<OverlayBox>,
    active_badges: BTreeSet<String>,
    images: Option<(String, String)>,
    chart: Option<String>,
    drop_highlighted: bool,
    uploads: UploadTracker,
}

impl Panel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: PanelEvent) -> Vec<PanelEffect> {
        match event {
            PanelEvent::DragOver => self.set_drop_highlight(true),
            PanelEvent::DragLeave => self.set_drop_highlight(false),
            PanelEvent::Dropped(file) => {
                let mut effects = self.set_drop_highlight(false);
                if let Some(file) = file {
                    effects.extend(self.submit(file));
                }
                effects
            }
            PanelEvent::DropZoneClicked => vec![PanelEffect::OpenFilePicker],
            PanelEvent::FilePicked(file) => self.submit(file),
            PanelEvent::UploadSettled { ticket, outcome } => self.settle(ticket, outcome),
            PanelEvent::OriginalImageLoaded { container_width } => {
                vec![PanelEffect::SetMarkedContainerWidth(container_width)]
            }
            PanelEvent::CardClicked { detection, image } => self.select_card(detection, &image),
            PanelEvent::BadgeClicked { class_name } => self.toggle_badge(class_name),
        }
    }

    pub fn predictions(&self) -> &[Detection] {
        &self.predictions
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn active_card(&self) -> Option<usize> {
        self.active_card
    }

    pub fn overlay(&self) -> Option<&OverlayBox> {
        self.overlay.as_ref()
    }

    pub fn is_badge_active(&self, class_name: &str) -> bool {
        self.active_badges.contains(class_name)
    }

    /// `(original_url, marked_url)` of the images on display.
    pub fn images(&self) -> Option<(&str, &str)> {
        self.images
            .as_ref()
            .map(|(original, marked)| (original.as_str(), marked.as_str()))
    }

    pub fn chart(&self) -> Option<&str> {
        self.chart.as_deref()
    }

    pub fn is_drop_highlighted(&self) -> bool {
        self.drop_highlighted
    }

    pub fn upload_in_flight(&self) -> Option<UploadTicket> {
        self.uploads.in_flight()
    }

    fn set_drop_highlight(&mut self, highlighted: bool) -> Vec<PanelEffect> {
        self.drop_highlighted = highlighted;
        vec![PanelEffect::HighlightDropZone(highlighted)]
    }

    fn submit(&mut self, file: SelectedFile) -> Vec<PanelEffect> {
        if let Err(rejected) = validate_file(&file) {
            tracing::warn!("Rejected upload: {}", rejected);
            return vec![PanelEffect::Alert(NOT_AN_IMAGE_ALERT.to_string())];
        }

        let (ticket, superseded) = self.uploads.begin();
        tracing::debug!("Submitting {} as upload {:?}", file.name, ticket);

        let mut effects = Vec::with_capacity(3);
        if let Some(previous) = superseded {
            tracing::debug!("Upload {:?} superseded by {:?}", previous, ticket);
            effects.push(PanelEffect::AbortUpload(previous));
        }
        effects.push(PanelEffect::ShowLoading);
        effects.push(PanelEffect::SubmitUpload(ticket));
        effects
    }

    fn settle(
        &mut self,
        ticket: UploadTicket,
        outcome: Result<PredictionResponse, ApiError>,
    ) -> Vec<PanelEffect> {
        if !self.uploads.settle(ticket) {
            tracing::debug!("Ignoring outcome of superseded upload {:?}", ticket);
            return Vec::new();
        }

        match outcome {
            Ok(response) => self.apply_response(response),
            Err(error) => vec![
                PanelEffect::LogError(error.to_string()),
                PanelEffect::Alert(PROCESSING_FAILED_ALERT.to_string()),
                PanelEffect::HideLoading,
            ],
        }
    }

    fn apply_response(&mut self, response: PredictionResponse) -> Vec<PanelEffect> {
        if let Some(error) = response.error {
            return vec![
                PanelEffect::LogError(ApiError::Server(error).to_string()),
                PanelEffect::Alert(PROCESSING_FAILED_ALERT.to_string()),
                PanelEffect::HideLoading,
            ];
        }

        self.predictions = response.predictions;
        self.cards = cards_for(&self.predictions);
        self.active_card = None;
        self.overlay = None;
        self.images = Some((
            response.original_image_url.clone(),
            response.marked_image_url.clone(),
        ));

        let mut effects = vec![
            PanelEffect::ShowImages {
                original_url: response.original_image_url,
                marked_url: response.marked_image_url,
            },
            PanelEffect::ClearOverlay,
            PanelEffect::RenderCards(self.cards.clone()),
        ];
        if let Some(graph_url) = response.graph_url {
            self.chart = Some(graph_url.clone());
            effects.push(PanelEffect::ShowChart(graph_url));
        }
        effects.push(PanelEffect::HideLoading);
        effects
    }

    fn select_card(&mut self, detection: usize, image: &ImageMetrics) -> Vec<PanelEffect> {
        if !self.cards.iter().any(|card| card.detection == detection) {
            tracing::debug!("Click on unknown card {}", detection);
            return Vec::new();
        }
        let Some(selected) = self.predictions.get(detection) else {
            return Vec::new();
        };

        self.active_card = Some(detection);
        let mut effects = vec![PanelEffect::ActivateCard(detection)];

        match overlay_for(selected, image) {
            Some(overlay) => {
                self.overlay = Some(overlay.clone());
                effects.push(PanelEffect::DrawOverlay(overlay));
            }
            None => {
                tracing::debug!("Original image has no natural size yet, no overlay drawn");
                self.overlay = None;
                effects.push(PanelEffect::ClearOverlay);
            }
        }
        effects
    }

    fn toggle_badge(&mut self, class_name: String) -> Vec<PanelEffect> {
        let active = if self.active_badges.remove(&class_name) {
            false
        } else {
            self.active_badges.insert(class_name.clone());
            true
        };

        self.cards = filter_by_class(&self.predictions, &class_name);
        if self
            .active_card
            .is_some_and(|active| !self.cards.iter().any(|card| card.detection == active))
        {
            self.active_card = None;
        }

        vec![
            PanelEffect::SetBadgeActive { class_name, active },
            PanelEffect::RenderCards(self.cards.clone()),
        ]
    }
}
