use std::cell::RefCell;
use std::rc::Rc;

use dioxus::prelude::*;
use dioxus_router::prelude::*;
use gloo_timers::future::TimeoutFuture;
use web_sys::EventSource;

mod api;
mod types;
mod ui_utils;
use types::{DownloadEvent, DownloadRequest, User};
use ui_utils::{copy_to_clipboard, fmt_bytes, fmt_ts, fmt_ts_opt, mask_key, show_toast, status_class};

/// The logged-in user, shared by every tab.
type Session = Signal<Option<User>>;

// ----- Routing -----
#[derive(Routable, Clone, Debug, PartialEq)]
#[rustfmt::skip]
pub enum Route {
    #[layout(Shell)]
        #[route("/")]
        Overview {},
        #[route("/downloads")]
        Downloads {},
        #[route("/keys")]
        Keys {},
        #[route("/logs")]
        Logs {},
        #[route("/settings")]
        Settings {},
        #[route("/search")]
        Search {},
}

pub fn main() {
    console_error_panic_hook::set_once();
    dioxus_web::launch::launch(app, vec![], Default::default());
}

fn app() -> Element {
    let _session: Session = use_context_provider(|| Signal::new(None));
    rsx! {
        Router::<Route> {}
        // Toast container for notifications
        div { id: "toasts", class: "toast-container" }
    }
}

// ----- Layout: header, tabs and the login gate -----
#[component]
fn Shell() -> Element {
    let mut session = use_context::<Session>();
    let mut checked = use_signal(|| false);

    use_effect(move || {
        spawn(async move {
            if let Ok(user) = api::current_user().await {
                session.set(Some(user));
            }
            checked.set(true);
        });
    });

    let logout = move |_| {
        spawn(async move {
            match api::logout().await {
                Ok(()) => session.set(None),
                Err(e) => show_toast(&format!("Logout failed: {}", e)),
            }
        });
    };

    if !checked() {
        return rsx! { div { class: "container", span { class: "spinner", "" } } };
    }

    let user = session.read().clone();
    match user {
        None => rsx! { Login {} },
        Some(user) => rsx! {
            div { class: "app-header",
                div { class: "container",
                    div { class: "brand", span { "Media DL Manager" } }
                    nav {
                        Link { to: Route::Overview {}, "Overview" }
                        Link { to: Route::Downloads {}, "Downloads" }
                        Link { to: Route::Keys {}, "API Keys" }
                        Link { to: Route::Logs {}, "Logs" }
                        Link { to: Route::Settings {}, "Settings" }
                        Link { to: Route::Search {}, "Search" }
                    }
                    div { class: "toolbar",
                        span { "{user.display_name()}" }
                        button { class: "btn", onclick: logout, "Log out" }
                    }
                }
            }
            div { class: "container", Outlet::<Route> {} }
        },
    }
}

#[component]
fn Login() -> Element {
    let mut session = use_context::<Session>();
    let mut email = use_signal(String::new);
    let mut name = use_signal(String::new);
    let mut token = use_signal(String::new);
    let mut busy = use_signal(|| false);
    let mut error = use_signal(|| None as Option<String>);

    let submit = move |e: FormEvent| {
        e.prevent_default();
        let req = types::LoginReq {
            email: email.read().trim().to_string(),
            first_name: Some(name.read().trim().to_string()).filter(|s| !s.is_empty()),
            token: Some(token.read().trim().to_string()).filter(|s| !s.is_empty()),
        };
        if req.email.is_empty() {
            error.set(Some("Email is required".into()));
            return;
        }
        busy.set(true);
        spawn(async move {
            match api::login(&req).await {
                Ok(user) => {
                    error.set(None);
                    session.set(Some(user));
                }
                Err(e) => error.set(Some(e)),
            }
            busy.set(false);
        });
    };

    rsx! {
        section { class: "panel login",
            h2 { "Media DL Manager" }
            form { onsubmit: submit,
                label { "Email" }
                input { r#type: "email", value: "{email}", oninput: move |e| email.set(e.value()) }
                label { "Name (optional)" }
                input { value: "{name}", oninput: move |e| name.set(e.value()) }
                label { "Admin token" }
                input { r#type: "password", value: "{token}", oninput: move |e| token.set(e.value()) }
                button { class: "btn btn-primary", r#type: "submit", disabled: busy(), "Log in" }
            }
            { error.read().as_ref().map(|e| rsx!(div { class: "alert alert-error", "{e}" })) }
        }
    }
}

// ----- Overview: stats cards and storage cleanup -----
#[component]
fn Overview() -> Element {
    let mut users = use_signal(types::UserStats::default);
    let mut downloads = use_signal(types::DownloadStats::default);
    let mut storage = use_signal(types::StorageStats::default);
    let mut server_ok = use_signal(|| None as Option<bool>);
    let mut err = use_signal(|| None as Option<String>);

    let mut reload = move || {
        spawn(async move {
            let result = async {
                users.set(api::user_stats().await?);
                downloads.set(api::download_stats().await?);
                storage.set(api::storage_stats().await?);
                Ok::<(), String>(())
            }
            .await;
            err.set(result.err());
            server_ok.set(api::healthz().await.ok());
        });
    };

    use_effect(move || reload());

    let cleanup = move |_| {
        spawn(async move {
            match api::cleanup_files().await {
                Ok(resp) => {
                    show_toast(&format!("Removed {} files", resp.removed));
                    reload();
                }
                Err(e) => show_toast(&format!("Cleanup failed: {}", e)),
            }
        });
    };

    let server_text = match server_ok() { Some(true) => "OK", Some(false) => "Error", None => "..." };
    let u = users.read().clone();
    let d = downloads.read().clone();
    let s = storage.read().clone();

    rsx! {
        section { class: "panel",
            div { class: "toolbar",
                h2 { "Overview" }
                span { "Server: {server_text}" }
                button { class: "btn", onclick: move |_| reload(), "Refresh" }
            }
            { err.read().as_ref().map(|e| rsx!(div { class: "alert alert-error", "{e}" })) }
            div { class: "cards",
                StatCard { label: "Users", value: u.total_users.to_string() }
                StatCard { label: "Active API keys", value: u.active_api_keys.to_string() }
                StatCard { label: "Requests today", value: u.requests_today.to_string() }
                StatCard { label: "Keys at limit", value: u.rate_limited.to_string() }
            }
            div { class: "cards",
                StatCard { label: "Downloads", value: d.total.to_string() }
                StatCard { label: "Pending", value: d.pending.to_string() }
                StatCard { label: "In progress", value: d.in_progress.to_string() }
                StatCard { label: "Completed today", value: format!("{} / {}", d.completed_today, d.completed) }
                StatCard { label: "Failed", value: d.failed.to_string() }
            }
            h3 { "Storage" }
            div { class: "cards",
                StatCard { label: "Files", value: s.total_files.to_string() }
                StatCard { label: "Total size", value: fmt_bytes(s.total_size) }
                StatCard { label: "Older than {s.cleanup_days} days", value: s.cleanup_eligible.to_string() }
            }
            button { class: "btn btn-danger", disabled: s.cleanup_eligible == 0, onclick: cleanup, "Clean up old files" }
        }
    }
}

#[component]
fn StatCard(label: String, value: String) -> Element {
    rsx! {
        div { class: "card",
            div { class: "card-label", "{label}" }
            div { class: "card-value", "{value}" }
        }
    }
}

// ----- Downloads: list, create, live progress, delete -----
#[component]
fn Downloads() -> Element {
    let mut rows = use_signal(Vec::<DownloadRequest>::new);
    let mut err = use_signal(|| None as Option<String>);
    let mut url = use_signal(String::new);
    let mut title = use_signal(String::new);
    let mut platform = use_signal(|| "youtube".to_string());

    let mut reload = move || {
        spawn(async move {
            match api::list_downloads(100).await {
                Ok(list) => { rows.set(list); err.set(None); }
                Err(e) => err.set(Some(e)),
            }
        });
    };

    use_effect(move || reload());

    // poll while something is still running
    use_future(move || async move {
        loop {
            TimeoutFuture::new(3_000).await;
            if rows.read().iter().any(|r| r.is_running()) {
                reload();
            }
        }
    });

    let create = move |e: FormEvent| {
        e.prevent_default();
        let req = types::CreateDownloadReq {
            url: url.read().trim().to_string(),
            platform: platform.read().clone(),
            title: Some(title.read().trim().to_string()).filter(|s| !s.is_empty()),
            api_key_id: None,
        };
        if req.url.is_empty() {
            show_toast("Please enter a URL");
            return;
        }
        spawn(async move {
            match api::create_download(&req).await {
                Ok(row) => {
                    show_toast("Download queued");
                    url.set(String::new());
                    title.set(String::new());
                    watch(row.id.clone(), rows);
                    rows.write().insert(0, row);
                }
                Err(e) => show_toast(&format!("Could not queue download: {}", e)),
            }
        });
    };

    let list = rows.read().clone();
    rsx! {
        section { class: "panel",
            div { class: "toolbar",
                h2 { "Downloads" }
                button { class: "btn", onclick: move |_| reload(), "Refresh" }
            }
            form { class: "toolbar", onsubmit: create,
                input { placeholder: "https://…", value: "{url}", oninput: move |e| url.set(e.value()) }
                input { placeholder: "Title (optional)", value: "{title}", oninput: move |e| title.set(e.value()) }
                select { value: "{platform}", onchange: move |e| platform.set(e.value()),
                    option { value: "youtube", "YouTube" }
                    option { value: "spotify", "Spotify" }
                    option { value: "instagram", "Instagram" }
                }
                button { class: "btn btn-primary", r#type: "submit", "Queue" }
            }
            { err.read().as_ref().map(|e| rsx!(div { class: "alert alert-error", "{e}" })) }
            table { class: "table",
                thead { tr {
                    th { "Title" } th { "Platform" } th { "Status" } th { "Progress" }
                    th { "File" } th { "User" } th { "Created" } th { "" }
                } }
                tbody {
                    for row in list {
                        DownloadRow { key: "{row.id}", row: row.clone(), on_deleted: move |_| reload() }
                    }
                }
            }
        }
    }
}

#[component]
fn DownloadRow(row: DownloadRequest, on_deleted: EventHandler<()>) -> Element {
    let id = row.id.clone();
    let delete = move |_| {
        let id = id.clone();
        spawn(async move {
            match api::delete_download(&id).await {
                Ok(()) => { show_toast("Download deleted"); on_deleted.call(()); }
                Err(e) => show_toast(&format!("Delete failed: {}", e)),
            }
        });
    };

    let title = row.title.clone().unwrap_or_else(|| "Unknown".into());
    let file = match (&row.file_name, row.file_size) {
        (Some(name), Some(size)) => format!("{} ({})", name, fmt_bytes(size)),
        _ => "—".into(),
    };
    let user = row.user_email.clone().unwrap_or_default();
    rsx! {
        tr {
            td { a { href: "{row.url}", target: "_blank", "{title}" } }
            td { "{row.platform}" }
            td {
                span { class: status_class(&row.status), "{row.status}" }
                { row.error_message.as_ref().map(|m| rsx!(div { class: "muted", "{m}" })) }
            }
            td { progress { max: "100", value: "{row.progress}" } " {row.progress}%" }
            td { "{file}" }
            td { "{user}" }
            td { "{fmt_ts(&row.created_at)}" }
            td { button { class: "btn btn-danger", onclick: delete, "Delete" } }
        }
    }
}

/// Follows a running download over SSE and patches its row in place.
fn watch(id: String, mut rows: Signal<Vec<DownloadRequest>>) {
    let holder: Rc<RefCell<Option<EventSource>>> = Rc::new(RefCell::new(None));
    let closer = holder.clone();
    let attached = api::sse_attach(&id, move |ev| {
        let terminal = matches!(ev, DownloadEvent::Completed { .. } | DownloadEvent::Failed { .. });
        {
            let mut list = rows.write();
            match ev {
                DownloadEvent::Started { id, .. } => {
                    if let Some(r) = list.iter_mut().find(|r| r.id == id) { r.status = "in_progress".into(); }
                }
                DownloadEvent::Progress { id, progress } => {
                    if let Some(r) = list.iter_mut().find(|r| r.id == id) {
                        r.status = "in_progress".into();
                        r.progress = progress;
                    }
                }
                DownloadEvent::Completed { id, file_name, file_size } => {
                    if let Some(r) = list.iter_mut().find(|r| r.id == id) {
                        r.status = "completed".into();
                        r.progress = 100;
                        r.file_name = Some(file_name);
                        r.file_size = Some(file_size);
                    }
                }
                DownloadEvent::Failed { id, message } => {
                    if let Some(r) = list.iter_mut().find(|r| r.id == id) {
                        r.status = "failed".into();
                        r.error_message = Some(message);
                    }
                }
            }
        }
        if terminal {
            if let Some(es) = closer.borrow_mut().take() { es.close(); }
        }
    });
    match attached {
        Ok(es) => *holder.borrow_mut() = Some(es),
        Err(e) => show_toast(&e),
    }
}

// ----- API keys of the current user -----
#[component]
fn Keys() -> Element {
    let session = use_context::<Session>();
    let uid = use_signal(|| session.read().as_ref().map(|u| u.id.clone()).unwrap_or_default());
    let mut keys = use_signal(Vec::<types::ApiKey>::new);
    let mut err = use_signal(|| None as Option<String>);
    let mut name = use_signal(String::new);
    let mut limit = use_signal(String::new);

    let mut reload = move || {
        spawn(async move {
            match api::list_keys(&uid.read()).await {
                Ok(list) => { keys.set(list); err.set(None); }
                Err(e) => err.set(Some(e)),
            }
        });
    };

    use_effect(move || reload());

    let create = move |e: FormEvent| {
        e.prevent_default();
        let request_limit = match limit.read().trim() {
            "" => None,
            raw => match raw.parse::<i64>() {
                Ok(n) => Some(n),
                Err(_) => { show_toast("Limit must be a number"); return; }
            },
        };
        let req = types::CreateKeyReq { name: name.read().trim().to_string(), request_limit };
        spawn(async move {
            match api::create_key(&uid.read(), &req).await {
                Ok(key) => {
                    show_toast("API key created");
                    copy_to_clipboard(key.key.clone());
                    name.set(String::new());
                    limit.set(String::new());
                    reload();
                }
                Err(e) => show_toast(&format!("Could not create key: {}", e)),
            }
        });
    };

    let list = keys.read().clone();
    rsx! {
        section { class: "panel",
            div { class: "toolbar",
                h2 { "API Keys" }
                button { class: "btn", onclick: move |_| reload(), "Refresh" }
            }
            form { class: "toolbar", onsubmit: create,
                input { placeholder: "Key name", value: "{name}", oninput: move |e| name.set(e.value()) }
                input { placeholder: "Request limit (default 10000)", value: "{limit}", oninput: move |e| limit.set(e.value()) }
                button { class: "btn btn-primary", r#type: "submit", "Create key" }
            }
            { err.read().as_ref().map(|e| rsx!(div { class: "alert alert-error", "{e}" })) }
            table { class: "table",
                thead { tr {
                    th { "Name" } th { "Key" } th { "Usage" } th { "Last used" } th { "Active" } th { "" }
                } }
                tbody {
                    for key in list {
                        KeyRow { key: "{key.id}", api_key: key.clone(), on_changed: move |_| reload() }
                    }
                }
            }
        }
    }
}

#[component]
fn KeyRow(api_key: types::ApiKey, on_changed: EventHandler<()>) -> Element {
    let id = api_key.id.clone();
    let active = api_key.is_active;
    let toggle = move |_| {
        let id = id.clone();
        spawn(async move {
            let req = types::UpdateKeyReq { is_active: Some(!active), ..Default::default() };
            match api::update_key(&id, &req).await {
                Ok(_) => on_changed.call(()),
                Err(e) => show_toast(&format!("Update failed: {}", e)),
            }
        });
    };

    let id = api_key.id.clone();
    let delete = move |_| {
        let id = id.clone();
        spawn(async move {
            match api::delete_key(&id).await {
                Ok(()) => { show_toast("API key deleted"); on_changed.call(()); }
                Err(e) => show_toast(&format!("Delete failed: {}", e)),
            }
        });
    };

    let secret = api_key.key.clone();
    let usage_class = if api_key.request_count >= api_key.request_limit { "badge badge-error" } else { "badge" };
    rsx! {
        tr {
            td { "{api_key.name}" }
            td {
                code { "{mask_key(&api_key.key)}" }
                button { class: "btn btn-small", onclick: move |_| copy_to_clipboard(secret.clone()), "Copy" }
            }
            td { span { class: usage_class, "{api_key.request_count} / {api_key.request_limit}" } }
            td { "{fmt_ts_opt(api_key.last_used_at.as_deref())}" }
            td { input { r#type: "checkbox", checked: active, onchange: toggle } }
            td { button { class: "btn btn-danger", onclick: delete, "Delete" } }
        }
    }
}

// ----- System logs -----
#[component]
fn Logs() -> Element {
    let mut logs = use_signal(Vec::<types::SystemLog>::new);
    let mut level = use_signal(|| "all".to_string());
    let mut err = use_signal(|| None as Option<String>);

    // reruns whenever the level filter changes
    use_effect(move || {
        let lvl = level();
        spawn(async move {
            let filter = (lvl != "all").then_some(lvl.as_str());
            match api::list_logs(200, filter).await {
                Ok(list) => { logs.set(list); err.set(None); }
                Err(e) => err.set(Some(e)),
            }
        });
    });

    rsx! {
        section { class: "panel",
            div { class: "toolbar",
                h2 { "System Logs" }
                select { value: "{level}", onchange: move |e| level.set(e.value()),
                    option { value: "all", "All levels" }
                    option { value: "info", "Info" }
                    option { value: "warning", "Warning" }
                    option { value: "error", "Error" }
                    option { value: "debug", "Debug" }
                }
            }
            { err.read().as_ref().map(|e| rsx!(div { class: "alert alert-error", "{e}" })) }
            table { class: "table",
                thead { tr { th { "Time" } th { "Level" } th { "Message" } th { "Details" } th { "User" } } }
                tbody {
                    for log in logs.read().iter() {
                        tr { key: "{log.id}",
                            td { "{fmt_ts(&log.timestamp)}" }
                            td { span { class: "badge level-{log.level}", "{log.level}" } }
                            td { "{log.message}" }
                            td { class: "muted", "{log.details.clone().unwrap_or_default()}" }
                            td { "{log.user_email.clone().unwrap_or_default()}" }
                        }
                    }
                }
            }
        }
    }
}

// ----- System settings -----
#[component]
fn Settings() -> Element {
    let mut settings = use_signal(Vec::<types::SystemSetting>::new);
    let mut err = use_signal(|| None as Option<String>);

    let mut reload = move || {
        spawn(async move {
            match api::list_settings().await {
                Ok(list) => { settings.set(list); err.set(None); }
                Err(e) => err.set(Some(e)),
            }
        });
    };

    use_effect(move || reload());

    rsx! {
        section { class: "panel",
            h2 { "Settings" }
            { err.read().as_ref().map(|e| rsx!(div { class: "alert alert-error", "{e}" })) }
            table { class: "table",
                thead { tr { th { "Key" } th { "Value" } th { "Description" } th { "Updated" } th { "" } } }
                tbody {
                    for setting in settings.read().iter() {
                        SettingRow { key: "{setting.id}", setting: setting.clone(), on_saved: move |_| reload() }
                    }
                }
            }
        }
    }
}

#[component]
fn SettingRow(setting: types::SystemSetting, on_saved: EventHandler<()>) -> Element {
    let mut value = use_signal(|| setting.value.clone());
    let key = setting.key.clone();
    let save = move |_| {
        let req = types::UpsertSettingReq { key: key.clone(), value: value.read().clone(), description: None };
        spawn(async move {
            match api::upsert_setting(&req).await {
                Ok(saved) => { show_toast(&format!("Saved {}", saved.key)); on_saved.call(()); }
                Err(e) => show_toast(&format!("Save failed: {}", e)),
            }
        });
    };
    let dirty = *value.read() != setting.value;
    rsx! {
        tr {
            td { code { "{setting.key}" } }
            td { input { value: "{value}", oninput: move |e| value.set(e.value()) } }
            td { class: "muted", "{setting.description.clone().unwrap_or_default()}" }
            td { "{fmt_ts(&setting.updated_at)}" }
            td { button { class: "btn", disabled: !dirty, onclick: save, "Save" } }
        }
    }
}

// ----- Platform search with one-click queueing -----
#[component]
fn Search() -> Element {
    let mut query = use_signal(String::new);
    let mut platform = use_signal(|| "all".to_string());
    let mut results = use_signal(Vec::<types::SearchResult>::new);
    let mut busy = use_signal(|| false);
    let mut err = use_signal(|| None as Option<String>);

    let run = move |e: FormEvent| {
        e.prevent_default();
        let q = query.read().trim().to_string();
        if q.is_empty() {
            return;
        }
        let p = platform.read().clone();
        busy.set(true);
        spawn(async move {
            match api::search(&q, &p).await {
                Ok(list) => { results.set(list); err.set(None); }
                Err(e) => err.set(Some(e)),
            }
            busy.set(false);
        });
    };

    rsx! {
        section { class: "panel",
            h2 { "Search" }
            form { class: "toolbar", onsubmit: run,
                input { placeholder: "Artist, title, …", value: "{query}", oninput: move |e| query.set(e.value()) }
                select { value: "{platform}", onchange: move |e| platform.set(e.value()),
                    option { value: "all", "All platforms" }
                    option { value: "youtube", "YouTube" }
                    option { value: "spotify", "Spotify" }
                }
                button { class: "btn btn-primary", r#type: "submit", disabled: busy(), "Search" }
                { busy().then(|| rsx!(span { class: "spinner", "" })) }
            }
            { err.read().as_ref().map(|e| rsx!(div { class: "alert alert-error", "{e}" })) }
            if results.read().is_empty() && !busy() {
                p { class: "muted", "No results." }
            }
            div { class: "results",
                for item in results.read().iter() {
                    SearchHit { key: "{item.platform}-{item.id}", item: item.clone() }
                }
            }
        }
    }
}

#[component]
fn SearchHit(item: types::SearchResult) -> Element {
    let req = types::CreateDownloadReq {
        url: item.url.clone(),
        platform: item.platform.clone(),
        title: Some(item.title.clone()),
        api_key_id: None,
    };
    let queue = move |_| {
        let req = req.clone();
        spawn(async move {
            match api::create_download(&req).await {
                Ok(_) => show_toast("Download queued"),
                Err(e) => show_toast(&format!("Could not queue download: {}", e)),
            }
        });
    };
    rsx! {
        div { class: "card result",
            { item.thumbnail.as_ref().map(|t| rsx!(img { src: "{t}", alt: "" })) }
            div {
                div { class: "card-value", "{item.title}" }
                div { class: "muted", "{item.artist} · {item.platform} {item.duration.clone().unwrap_or_default()}" }
            }
            button { class: "btn", onclick: queue, "Download" }
        }
    }
}
