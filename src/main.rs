//! Age Gate entry point
//!
//! On the web: installs logging, builds the browser persistence chain and
//! wires the gate overlay to the DOM.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_gate {
    use std::rc::Rc;
    use wasm_bindgen::prelude::*;
    use web_sys::Document;

    use age_gate::{AgeGate, GateState, VerificationConfig, VerificationPersistence};

    /// Show/hide the overlay for the current state
    fn render(document: &Document, state: GateState) {
        if let Some(el) = document.get_element_by_id("age-gate") {
            let class = match state {
                GateState::Verified => "hidden",
                GateState::Checking => "checking",
                GateState::Prompt => "",
            };
            let _ = el.set_attribute("class", class);
        }
    }

    pub fn run() {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).expect("Failed to init logger");

        log::info!("Age gate starting...");

        let Some(window) = web_sys::window() else {
            return;
        };
        let Some(document) = window.document() else {
            return;
        };

        let config = VerificationConfig::default();
        let persistence = Rc::new(VerificationPersistence::for_browser(config.clone()));
        {
            let persistence = persistence.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let diag = persistence.diagnostics_async().await;
                log::info!("Storage diagnostics: {}", diag.to_json());
            });
        }

        let gate = AgeGate::new(persistence);
        {
            let document = document.clone();
            gate.on_change(move |state| render(&document, state));
        }

        // Sync answer first so returning visitors never see the overlay
        render(&document, gate.check());
        gate.refresh();

        setup_buttons(&document, gate.clone(), config.exit_url);
        setup_recheck(gate);

        log::info!("Age gate running!");
    }

    fn setup_buttons(document: &Document, gate: Rc<AgeGate>, exit_url: String) {
        // Confirm
        if let Some(btn) = document.get_element_by_id("age-confirm") {
            let gate = gate.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::MouseEvent| {
                gate.confirm();
            });
            let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Deny - leave the site
        if let Some(btn) = document.get_element_by_id("age-deny") {
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::MouseEvent| {
                if let Some(window) = web_sys::window() {
                    let _ = window.location().set_href(&exit_url);
                }
            });
            let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }

        // Reset (settings page)
        if let Some(btn) = document.get_element_by_id("age-reset") {
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::MouseEvent| {
                gate.reset();
                log::info!("Age verification reset by user");
            });
            let _ = btn.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }

    fn setup_recheck(gate: Rc<AgeGate>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let Some(document) = window.document() else {
            return;
        };

        // Visibility change (tab switch back)
        {
            let gate = gate.clone();
            let document_clone = document.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::Event| {
                if document_clone.visibility_state() == web_sys::VisibilityState::Visible {
                    gate.refresh();
                }
            });
            let _ = document.add_event_listener_with_callback(
                "visibilitychange",
                closure.as_ref().unchecked_ref(),
            );
            closure.forget();
        }

        // Window focus
        {
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: web_sys::FocusEvent| {
                gate.refresh();
            });
            let _ = window.add_event_listener_with_callback("focus", closure.as_ref().unchecked_ref());
            closure.forget();
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    wasm_gate::run();
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use std::rc::Rc;

    use age_gate::persistence::{MemoryBackup, MemoryTier, TierKind};
    use age_gate::{VerificationConfig, VerificationPersistence};

    env_logger::init();
    log::info!("Age gate (native) starting...");
    log::info!("Browser storage requires wasm32 - run with `trunk serve` for the web version");

    // Memory-backed stand-ins for the browser tiers
    let persistence = VerificationPersistence::builder(VerificationConfig::default())
        .tier(Box::new(MemoryTier::with_kind(TierKind::LocalStorage)))
        .backup(Rc::new(MemoryBackup::new()))
        .build();

    persistence.save();
    println!("{}", persistence.diagnostics().to_json());
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}
