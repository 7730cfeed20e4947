use crate::{cards::Card, geometry::{ImageMetrics, OverlayBox}};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlElement, HtmlImageElement, HtmlInputElement};

const ACTIVE: &str = "active";
const DRAGOVER: &str = "dragover";

fn element_by_id<T: JsCast>(document: &Document, id: &str) -> Result<T, JsValue> {
    document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("missing #{}", id)))?
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("#{} has an unexpected element type", id)))
}

fn element_by_selector<T: JsCast>(document: &Document, selector: &str) -> Result<T, JsValue> {
    document
        .query_selector(selector)?
        .ok_or_else(|| JsValue::from_str(&format!("missing {}", selector)))?
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("{} has an unexpected element type", selector)))
}

fn elements_by_selector(document: &Document, selector: &str) -> Result<Vec<Element>, JsValue> {
    let nodes = document.query_selector_all(selector)?;
    Ok((0..nodes.length())
        .filter_map(|i| nodes.get(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect())
}

fn set_display(element: &HtmlElement, value: &str) -> Result<(), JsValue> {
    element.style().set_property("display", value)
}

/// Handles on the elements of the page's DOM contract.
pub struct View {
    pub document: Document,
    pub drop_zone: HtmlElement,
    pub file_input: HtmlInputElement,
    pub loading: HtmlElement,
    pub original_image: HtmlImageElement,
    pub marked_image: HtmlImageElement,
    pub graphs_image: HtmlImageElement,
    pub predictions: Element,
    pub image_container: Element,
    pub badges: Vec<HtmlElement>,
}

impl View {
    pub fn bind(document: Document) -> Result<Self, JsValue> {
        let badges = elements_by_selector(&document, ".class-badge")?
            .into_iter()
            .filter_map(|badge| badge.dyn_into::<HtmlElement>().ok())
            .collect();

        Ok(Self {
            drop_zone: element_by_id(&document, "dropZone")?,
            file_input: element_by_id(&document, "fileInput")?,
            loading: element_by_selector(&document, ".loading")?,
            original_image: element_by_id(&document, "originalImage")?,
            marked_image: element_by_id(&document, "markedImage")?,
            graphs_image: element_by_id(&document, "graphsImage")?,
            predictions: element_by_id(&document, "predictions")?,
            image_container: element_by_selector(&document, ".image-container")?,
            badges,
            document,
        })
    }

    pub fn original_metrics(&self) -> ImageMetrics {
        let rect = self.original_image.get_bounding_client_rect();
        ImageMetrics {
            rendered_width: rect.width(),
            rendered_height: rect.height(),
            natural_width: self.original_image.natural_width() as f64,
            natural_height: self.original_image.natural_height() as f64,
        }
    }

    pub fn original_container_width(&self) -> f64 {
        self.original_image
            .parent_element()
            .and_then(|parent| parent.dyn_into::<HtmlElement>().ok())
            .map(|parent| parent.offset_width() as f64)
            .unwrap_or_default()
    }

    pub fn highlight_drop_zone(&self, highlighted: bool) -> Result<(), JsValue> {
        self.drop_zone
            .class_list()
            .toggle_with_force(DRAGOVER, highlighted)
            .map(|_| ())
    }

    pub fn set_loading(&self, visible: bool) -> Result<(), JsValue> {
        set_display(&self.loading, if visible { "flex" } else { "none" })
    }

    pub fn show_images(&self, original_url: &str, marked_url: &str) -> Result<(), JsValue> {
        self.original_image.set_src(original_url);
        self.marked_image.set_src(marked_url);
        set_display(&self.original_image, "block")?;
        set_display(&self.marked_image, "block")
    }

    pub fn set_marked_container_width(&self, width: f64) -> Result<(), JsValue> {
        let Some(container) = self
            .marked_image
            .parent_element()
            .and_then(|parent| parent.dyn_into::<HtmlElement>().ok())
        else {
            return Ok(());
        };
        container
            .style()
            .set_property("width", &format!("{}px", width))
    }

    pub fn show_chart(&self, url: &str) -> Result<(), JsValue> {
        self.graphs_image.set_src(url);
        set_display(&self.graphs_image, "block")
    }

    pub fn clear_overlay(&self) -> Result<(), JsValue> {
        for overlay in elements_by_selector(&self.document, ".bounding-box")? {
            overlay.remove();
        }
        Ok(())
    }

    pub fn draw_overlay(&self, overlay: &OverlayBox) -> Result<(), JsValue> {
        self.clear_overlay()?;

        let bbox = self.document.create_element("div")?;
        bbox.set_class_name("bounding-box active");
        bbox.set_attribute(
            "style",
            &format!(
                "left: {}px; top: {}px; width: {}px; height: {}px;",
                overlay.left, overlay.top, overlay.width, overlay.height
            ),
        )?;

        let label = self.document.create_element("div")?;
        label.set_class_name("bounding-box-label");
        label.set_attribute(
            "style",
            "position: absolute; top: -25px; left: 0; background-color: #0d6efd; \
             color: white; padding: 2px 6px; border-radius: 3px; font-size: 12px;",
        )?;
        label.set_text_content(Some(&overlay.label));
        bbox.append_child(&label)?;

        self.image_container.append_child(&bbox)?;
        Ok(())
    }

    /// Rebuilds the card list and returns each card element with the
    /// detection it shows.
    pub fn render_cards(&self, cards: &[Card]) -> Result<Vec<(Element, usize)>, JsValue> {
        self.predictions.set_inner_html("");

        let mut rendered = Vec::with_capacity(cards.len());
        for card in cards {
            let column = self.document.create_element("div")?;
            column.set_class_name("col-md-6");

            let body_card = self.document.create_element("div")?;
            body_card.set_class_name("card prediction-card");
            body_card.set_attribute("data-index", &card.detection.to_string())?;

            let body = self.document.create_element("div")?;
            body.set_class_name("card-body");

            let title = self.document.create_element("h6")?;
            title.set_class_name("card-title");
            title.set_text_content(Some(&card.title));

            let text = self.document.create_element("p")?;
            text.set_class_name("card-text");
            let confidence = self.document.create_element("span")?;
            confidence.set_text_content(Some(&card.confidence_text));
            let line_break = self.document.create_element("br")?;
            let coordinates = self.document.create_element("span")?;
            coordinates.set_text_content(Some(&card.coordinates_text));
            text.append_child(&confidence)?;
            text.append_child(&line_break)?;
            text.append_child(&coordinates)?;

            body.append_child(&title)?;
            body.append_child(&text)?;
            body_card.append_child(&body)?;
            column.append_child(&body_card)?;
            self.predictions.append_child(&column)?;

            rendered.push((body_card, card.detection));
        }
        Ok(rendered)
    }

    pub fn activate_card(&self, detection: usize) -> Result<(), JsValue> {
        let wanted = detection.to_string();
        for card in elements_by_selector(&self.document, ".prediction-card")? {
            let is_target = card.get_attribute("data-index").as_deref() == Some(wanted.as_str());
            card.class_list().toggle_with_force(ACTIVE, is_target)?;
        }
        Ok(())
    }

    pub fn set_badge_active(&self, class_name: &str, active: bool) -> Result<(), JsValue> {
        for badge in &self.badges {
            if badge.dataset().get("class").as_deref() == Some(class_name) {
                badge.class_list().toggle_with_force(ACTIVE, active)?;
            }
        }
        Ok(())
    }
}
