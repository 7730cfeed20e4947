mod console;
mod fetch;
mod view;

use crate::{
    panel::{Panel, PanelEffect, PanelEvent},
    upload::{SelectedFile, UploadTicket},
};
use std::{cell::RefCell, collections::HashMap, rc::Rc};
use view::View;
use wasm_bindgen::{prelude::*, JsCast};
use web_sys::{AbortController, DragEvent, Event, File, FileList, MouseEvent};

fn first_file(files: Option<FileList>) -> Option<File> {
    files.and_then(|list| list.get(0))
}

fn describe(file: &File) -> SelectedFile {
    SelectedFile::new(file.name(), file.type_())
}

/// Owns the panel and applies its effects to the page.
struct Controller {
    panel: RefCell<Panel>,
    view: View,
    uploads: RefCell<HashMap<UploadTicket, AbortController>>,
    card_listeners: RefCell<Vec<Closure<dyn FnMut(MouseEvent)>>>,
}

impl Controller {
    /// `file` is the file the event carried, used by `SubmitUpload`.
    fn dispatch(self: &Rc<Self>, event: PanelEvent, file: Option<&File>) {
        let effects = self.panel.borrow_mut().handle(event);
        for effect in effects {
            if let Err(e) = self.apply(effect, file) {
                tracing::error!("Failed to update the page: {:?}", e);
            }
        }
    }

    fn apply(self: &Rc<Self>, effect: PanelEffect, file: Option<&File>) -> Result<(), JsValue> {
        let view = &self.view;
        match effect {
            PanelEffect::HighlightDropZone(highlighted) => view.highlight_drop_zone(highlighted),
            PanelEffect::OpenFilePicker => {
                view.file_input.click();
                Ok(())
            }
            PanelEffect::Alert(message) => match web_sys::window() {
                Some(window) => window.alert_with_message(&message),
                None => Ok(()),
            },
            PanelEffect::LogError(detail) => {
                tracing::error!("Prediction failed: {}", detail);
                Ok(())
            }
            PanelEffect::ShowLoading => view.set_loading(true),
            PanelEffect::HideLoading => view.set_loading(false),
            PanelEffect::SubmitUpload(ticket) => match file {
                Some(file) => self.submit(ticket, file.clone()),
                None => Err(JsValue::from_str("upload requested without a file")),
            },
            PanelEffect::AbortUpload(ticket) => {
                if let Some(controller) = self.uploads.borrow_mut().remove(&ticket) {
                    controller.abort();
                }
                Ok(())
            }
            PanelEffect::ShowImages {
                original_url,
                marked_url,
            } => view.show_images(&original_url, &marked_url),
            PanelEffect::SetMarkedContainerWidth(width) => view.set_marked_container_width(width),
            PanelEffect::ClearOverlay => view.clear_overlay(),
            PanelEffect::DrawOverlay(overlay) => view.draw_overlay(&overlay),
            PanelEffect::RenderCards(cards) => self.render_cards(&cards),
            PanelEffect::ActivateCard(detection) => view.activate_card(detection),
            PanelEffect::ShowChart(url) => view.show_chart(&url),
            PanelEffect::SetBadgeActive { class_name, active } => {
                view.set_badge_active(&class_name, active)
            }
        }
    }

    fn submit(self: &Rc<Self>, ticket: UploadTicket, file: File) -> Result<(), JsValue> {
        let abort = AbortController::new()?;
        let signal = abort.signal();
        self.uploads.borrow_mut().insert(ticket, abort);

        let controller = Rc::clone(self);
        wasm_bindgen_futures::spawn_local(async move {
            let outcome = fetch::post_image(&file, &signal).await;
            controller.uploads.borrow_mut().remove(&ticket);
            controller.dispatch(PanelEvent::UploadSettled { ticket, outcome }, None);
        });
        Ok(())
    }

    fn render_cards(self: &Rc<Self>, cards: &[crate::cards::Card]) -> Result<(), JsValue> {
        let rendered = self.view.render_cards(cards)?;

        let mut listeners = Vec::with_capacity(rendered.len());
        for (element, detection) in rendered {
            let controller = Rc::clone(self);
            let on_click = Closure::<dyn FnMut(MouseEvent)>::new(move |_event: MouseEvent| {
                let image = controller.view.original_metrics();
                controller.dispatch(PanelEvent::CardClicked { detection, image }, None);
            });
            element.add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())?;
            listeners.push(on_click);
        }
        // The previous cards are gone from the page, so their listeners can go too.
        *self.card_listeners.borrow_mut() = listeners;
        Ok(())
    }
}

fn bind_events(controller: &Rc<Controller>) -> Result<(), JsValue> {
    let view = &controller.view;

    let c = Rc::clone(controller);
    let on_dragover = Closure::<dyn FnMut(DragEvent)>::new(move |event: DragEvent| {
        event.prevent_default();
        c.dispatch(PanelEvent::DragOver, None);
    });
    view.drop_zone
        .add_event_listener_with_callback("dragover", on_dragover.as_ref().unchecked_ref())?;
    on_dragover.forget();

    let c = Rc::clone(controller);
    let on_dragleave = Closure::<dyn FnMut(DragEvent)>::new(move |_event: DragEvent| {
        c.dispatch(PanelEvent::DragLeave, None);
    });
    view.drop_zone
        .add_event_listener_with_callback("dragleave", on_dragleave.as_ref().unchecked_ref())?;
    on_dragleave.forget();

    let c = Rc::clone(controller);
    let on_drop = Closure::<dyn FnMut(DragEvent)>::new(move |event: DragEvent| {
        event.prevent_default();
        let file = first_file(event.data_transfer().and_then(|data| data.files()));
        c.dispatch(PanelEvent::Dropped(file.as_ref().map(describe)), file.as_ref());
    });
    view.drop_zone
        .add_event_listener_with_callback("drop", on_drop.as_ref().unchecked_ref())?;
    on_drop.forget();

    let c = Rc::clone(controller);
    let on_zone_click = Closure::<dyn FnMut(MouseEvent)>::new(move |_event: MouseEvent| {
        c.dispatch(PanelEvent::DropZoneClicked, None);
    });
    view.drop_zone
        .add_event_listener_with_callback("click", on_zone_click.as_ref().unchecked_ref())?;
    on_zone_click.forget();

    let c = Rc::clone(controller);
    let on_change = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
        if let Some(file) = first_file(c.view.file_input.files()) {
            c.dispatch(PanelEvent::FilePicked(describe(&file)), Some(&file));
        }
    });
    view.file_input
        .add_event_listener_with_callback("change", on_change.as_ref().unchecked_ref())?;
    on_change.forget();

    let c = Rc::clone(controller);
    let on_original_load = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
        let container_width = c.view.original_container_width();
        c.dispatch(PanelEvent::OriginalImageLoaded { container_width }, None);
    });
    view.original_image
        .add_event_listener_with_callback("load", on_original_load.as_ref().unchecked_ref())?;
    on_original_load.forget();

    for badge in &view.badges {
        let Some(class_name) = badge.dataset().get("class") else {
            tracing::warn!("Class badge without data-class, skipped");
            continue;
        };
        let c = Rc::clone(controller);
        let on_badge = Closure::<dyn FnMut(MouseEvent)>::new(move |_event: MouseEvent| {
            c.dispatch(
                PanelEvent::BadgeClicked {
                    class_name: class_name.clone(),
                },
                None,
            );
        });
        badge.add_event_listener_with_callback("click", on_badge.as_ref().unchecked_ref())?;
        on_badge.forget();
    }

    Ok(())
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    console::init_tracing();

    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("no document"))?;

    let controller = Rc::new(Controller {
        panel: RefCell::new(Panel::new()),
        view: View::bind(document)?,
        uploads: RefCell::new(HashMap::new()),
        card_listeners: RefCell::new(Vec::new()),
    });
    bind_events(&controller)?;

    tracing::info!("Upload panel ready with {} class badges", controller.view.badges.len());
    Ok(())
}
