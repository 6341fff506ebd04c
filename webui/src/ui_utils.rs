use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

// Format bytes using binary units
pub fn fmt_bytes(n: i64) -> String {
    let mut v = n.max(0) as f64;
    let units = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut i = 0usize;
    while v >= 1024.0 && i < units.len() - 1 {
        v /= 1024.0;
        i += 1;
    }
    if v >= 10.0 {
        format!("{:.0} {}", v, units[i])
    } else {
        format!("{:.1} {}", v, units[i])
    }
}

/// `2024-05-01T12:30:00Z` -> `2024-05-01 12:30`. Anything else passes through.
pub fn fmt_ts(ts: &str) -> String {
    match ts.split_once('T') {
        Some((date, time)) => format!("{} {}", date, time.get(..5).unwrap_or(time)),
        None => ts.to_string(),
    }
}

pub fn fmt_ts_opt(ts: Option<&str>) -> String {
    ts.map(fmt_ts).unwrap_or_else(|| "—".to_string())
}

/// Shows the `sk-` prefix and the last four characters only.
pub fn mask_key(key: &str) -> String {
    if key.len() <= 10 {
        return key.to_string();
    }
    format!("{}…{}", &key[..6], &key[key.len() - 4..])
}

// CSS class for a download status badge
pub fn status_class(status: &str) -> &'static str {
    match status {
        "completed" => "badge badge-ok",
        "failed" => "badge badge-error",
        "in_progress" => "badge badge-info",
        _ => "badge",
    }
}

// Copy text to clipboard and show a toast on success
pub fn copy_to_clipboard(text: String) {
    if let Some(win) = web_sys::window() {
        let nav = win.navigator();
        let clip = nav.clipboard();
        let promise = clip.write_text(&text);
        wasm_bindgen_futures::spawn_local(async move {
            match JsFuture::from(promise).await {
                Ok(_) => show_toast("Copied to clipboard"),
                Err(_) => show_toast("Copy failed"),
            }
        });
    }
}

// Show a transient toast in the #toasts container
pub fn show_toast(message: &str) {
    if let Some(win) = web_sys::window() {
        if let Some(doc) = win.document() {
            if let Some(container) = doc.get_element_by_id("toasts") {
                if let Ok(toast) = doc.create_element("div") {
                    toast.set_class_name("toast fade-in");
                    toast.set_text_content(Some(message));
                    if container.append_child(&toast).is_err() {
                        return;
                    }

                    let container_clone = container.clone();
                    let toast_clone = toast.clone();
                    let cb = Closure::wrap(Box::new(move || {
                        let _ = container_clone.remove_child(&toast_clone);
                    }) as Box<dyn FnMut()>);
                    let _ = win.set_timeout_with_callback_and_timeout_and_arguments_0(
                        cb.as_ref().unchecked_ref(),
                        2000,
                    );
                    cb.forget();
                }
            }
        }
    }
}
