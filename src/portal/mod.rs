//! Config portal controller.
//!
//! Serves the configuration form, validates and persists submitted
//! values, and redirects stray captive-portal requests back to the
//! device. One request is processed at a time, to completion; the
//! embedding code drives the transport through [`ServerDriver`].

mod html;

pub use html::{DefaultHtmlProvider, HtmlFormatProvider};

use std::time::{Duration, Instant};

use http::{header, StatusCode};
use serde::Serialize;

use crate::parameter::{Node, NodeRef, Parameter, ParameterGroup, PASSWORD_LEN, WORD_LEN};
use crate::persist::VersionedStorage;
use crate::request::WebRequest;
use crate::store::ConfigStore;

/// User name for HTTP Basic auth on the config page.
pub const ADMIN_USERNAME: &str = "admin";

/// Hidden form field marking a submission.
pub const SAVE_FIELD: &str = "configSave";

/// Field id of the built-in thing-name parameter.
pub const THING_NAME_ID: &str = "thingName";

/// Field id of the built-in AP-password parameter.
pub const AP_PASSWORD_ID: &str = "apPassword";

/// Hooks the portal re-enters while a caller-level wait is in
/// progress, so DNS and HTTP stay serviced. Implemented by the
/// embedding binary over its real network stack.
pub trait ServerDriver {
    /// Service one pending DNS request, if any.
    fn process_dns(&mut self);
    /// Service one pending HTTP client, if any.
    fn handle_client(&mut self);
}

#[derive(Serialize)]
struct DeviceStatus {
    version: String,
    thing_name: String,
}

/// The portal. Owns the parameter tree; the store and each request
/// are passed in per call.
///
/// Tree shape: `all` is the authoritative persistence root and links
/// the `system`, `custom` and `hidden` groups. The form renders
/// `system` and `custom` only; `hidden` is persisted but never shown.
pub struct ConfigPortal {
    version: String,
    initial_ap_password: String,
    storage: VersionedStorage,
    all_params: NodeRef,
    system_params: NodeRef,
    custom_groups: NodeRef,
    hidden_params: NodeRef,
    thing_name_param: NodeRef,
    ap_password_param: NodeRef,
    html: Box<dyn HtmlFormatProvider>,
    update_path: Option<String>,
    config_saving_cb: Option<Box<dyn FnMut(usize)>>,
    config_saved_cb: Option<Box<dyn FnMut()>>,
    form_validator: Option<Box<dyn FnMut(&dyn WebRequest) -> bool>>,
}

impl ConfigPortal {
    /// `thing_name` seeds the thing-name parameter's default;
    /// `initial_ap_password` is applied whenever no valid
    /// configuration is found; `config_version` tags the persisted
    /// layout (see [`VersionedStorage::new`]).
    pub fn new(thing_name: &str, initial_ap_password: &str, config_version: &str) -> Self {
        let thing_name_param = Node::item(Parameter::text(
            "Thing name",
            THING_NAME_ID,
            thing_name,
            WORD_LEN,
        ));
        let ap_password_param =
            Node::item(Parameter::password("AP password", AP_PASSWORD_ID, PASSWORD_LEN));

        let mut system = ParameterGroup::with_label("system", "System configuration");
        system.add_item(thing_name_param.clone());
        system.add_item(ap_password_param.clone());
        let system_params = Node::group(system);

        let custom_groups = Node::group(ParameterGroup::new("custom"));
        let hidden_params = Node::group(ParameterGroup::new("hidden"));

        // The same group nodes sit under the authoritative root and
        // are addressed directly for render/update; storage is not
        // duplicated.
        let mut all = ParameterGroup::new("all");
        all.add_item(system_params.clone());
        all.add_item(custom_groups.clone());
        all.add_item(hidden_params.clone());

        Self {
            version: config_version.to_string(),
            initial_ap_password: initial_ap_password.to_string(),
            storage: VersionedStorage::new(config_version, 0),
            all_params: Node::group(all),
            system_params,
            custom_groups,
            hidden_params,
            thing_name_param,
            ap_password_param,
            html: Box::new(DefaultHtmlProvider),
            update_path: None,
            config_saving_cb: None,
            config_saved_cb: None,
            form_validator: None,
        }
    }

    /// Shift the persisted layout within the store region.
    pub fn with_base_offset(mut self, offset: usize) -> Self {
        self.storage = VersionedStorage::new(&self.version, offset);
        self
    }

    pub fn set_html_format_provider(&mut self, provider: Box<dyn HtmlFormatProvider>) {
        self.html = provider;
    }

    /// Advertise a firmware-update link at the bottom of the form.
    pub fn set_update_path(&mut self, path: &str) {
        self.update_path = Some(path.to_string());
    }

    /// Fires with the total region size before a save writes any byte.
    pub fn set_config_saving_callback(&mut self, cb: Box<dyn FnMut(usize)>) {
        self.config_saving_cb = Some(cb);
    }

    /// Fires after a save has released the store.
    pub fn set_config_saved_callback(&mut self, cb: Box<dyn FnMut()>) {
        self.config_saved_cb = Some(cb);
    }

    /// External validation, run before the built-in checks. Returning
    /// `false` blocks the save; per-item error messages should be set
    /// on the parameters directly.
    pub fn set_form_validator(&mut self, validator: Box<dyn FnMut(&dyn WebRequest) -> bool>) {
        self.form_validator = Some(validator);
    }

    /// Register a custom group. Call before [`ConfigPortal::init`].
    pub fn add_parameter_group(&mut self, group: NodeRef) {
        push_child(&self.custom_groups, group);
    }

    /// Register a parameter that is persisted but never rendered.
    /// Call before [`ConfigPortal::init`].
    pub fn add_hidden_parameter(&mut self, parameter: NodeRef) {
        push_child(&self.hidden_params, parameter);
    }

    /// Register an extra parameter in the system group. Call before
    /// [`ConfigPortal::init`].
    pub fn add_system_parameter(&mut self, parameter: NodeRef) {
        push_child(&self.system_params, parameter);
    }

    pub fn thing_name(&self) -> String {
        leaf_value(&self.thing_name_param)
    }

    pub fn thing_name_parameter(&self) -> NodeRef {
        self.thing_name_param.clone()
    }

    pub fn ap_password_parameter(&self) -> NodeRef {
        self.ap_password_param.clone()
    }

    pub fn system_parameter_group(&self) -> NodeRef {
        self.system_params.clone()
    }

    /// Load the configuration and prepare the portal. Returns `false`
    /// when no valid configuration was present (first boot or version
    /// change); defaults are in effect and the AP password is the
    /// construction-time initial one.
    pub fn init(&mut self, store: &mut dyn ConfigStore) -> bool {
        let valid = self.load_config(store);
        if !valid {
            let initial = self.initial_ap_password.clone();
            set_leaf_value(&self.ap_password_param, &initial);
        }
        log::info!("portal initialized, valid config: {}", valid);
        valid
    }

    /// Load all parameters from the store. `false` means the version
    /// tag did not match and defaults were applied.
    pub fn load_config(&mut self, store: &mut dyn ConfigStore) -> bool {
        let root = self.all_params.clone();
        let mut root = root.lock().unwrap();
        self.storage.load(&mut root, store)
    }

    /// Persist all parameters. Also for embedders that mutate
    /// parameter buffers directly.
    pub fn save_config(&mut self, store: &mut dyn ConfigStore) {
        let root = self.all_params.clone();
        let root = root.lock().unwrap();
        self.storage.save(
            &root,
            store,
            self.config_saving_cb.as_deref_mut(),
            self.config_saved_cb.as_deref_mut(),
        );
    }

    /// Config page handler: authenticate, then render the form or
    /// validate-and-save a submission.
    pub fn handle_config(
        &mut self,
        req: &mut dyn WebRequest,
        store: &mut dyn ConfigStore,
    ) -> anyhow::Result<()> {
        let ap_password = leaf_value(&self.ap_password_param);
        if !req.authenticate(ADMIN_USERNAME, &ap_password) {
            log::info!("config request rejected, requesting authentication");
            req.request_authentication();
            return Ok(());
        }

        let data_arrived = req.has_field(SAVE_FIELD);
        if !data_arrived || !self.validate_form(&*req) {
            self.render_config_page(data_arrived, req)?;
            return Ok(());
        }

        log::info!("updating configuration");
        self.system_params.lock().unwrap().update(&*req);
        self.custom_groups.lock().unwrap().update(&*req);
        self.save_config(store);

        let mut page = self.html.head().replace("{v}", &self.thing_name());
        page.push_str(&self.html.script());
        page.push_str(&self.html.style());
        page.push_str(&self.html.head_extension());
        page.push_str(&self.html.head_end());
        page.push_str(&self.html.form_saved());
        page.push_str(&self.html.end());

        req.send_header(header::CONTENT_LENGTH.as_str(), &page.len().to_string());
        req.send(StatusCode::OK, "text/html; charset=UTF-8", &page)?;
        Ok(())
    }

    /// Redirect to the device's own address if the request targeted
    /// another host. Returns `true` when the request was handled here
    /// and the caller must not touch it further.
    pub fn handle_captive_portal(&self, req: &mut dyn WebRequest) -> anyhow::Result<bool> {
        let host = req.host_header();
        let thing_name = self.thing_name().to_lowercase();
        if !is_ip(&host) && !host.to_lowercase().starts_with(&thing_name) {
            let location = format!("http://{}", req.local_ip());
            log::info!("request for {} redirected to {}", host, location);
            req.send_header(header::LOCATION.as_str(), &location);
            // Empty body inhibits a Content-Length header, so the
            // connection has to be closed explicitly.
            req.send(StatusCode::FOUND, "text/plain", "")?;
            req.stop();
            return Ok(true);
        }
        Ok(false)
    }

    /// Unknown-path handler. Runs the captive-portal check first and
    /// only then reports the missing page.
    pub fn handle_not_found(&self, req: &mut dyn WebRequest) -> anyhow::Result<()> {
        if self.handle_captive_portal(req)? {
            return Ok(());
        }
        let message = format!("Requested a non-existing page\n\nURI: {}\n", req.uri());
        log::info!("requested a non-existing page '{}'", req.uri());

        req.send_header(header::CACHE_CONTROL.as_str(), "no-cache, no-store, must-revalidate");
        req.send_header(header::PRAGMA.as_str(), "no-cache");
        req.send_header(header::EXPIRES.as_str(), "-1");
        req.send_header(header::CONTENT_LENGTH.as_str(), &message.len().to_string());
        req.send(StatusCode::NOT_FOUND, "text/plain", &message)?;
        Ok(())
    }

    /// Device status as JSON, for scripted clients.
    pub fn handle_status(&self, req: &mut dyn WebRequest) -> anyhow::Result<()> {
        let status = DeviceStatus {
            version: self.version.clone(),
            thing_name: self.thing_name(),
        };
        let json = serde_json::to_string(&status)?;
        req.send(StatusCode::OK, "application/json", &json)?;
        Ok(())
    }

    /// One cooperative step: service DNS, then HTTP.
    pub fn do_loop(&mut self, driver: &mut dyn ServerDriver) {
        driver.process_dns();
        driver.handle_client();
    }

    /// Wait without going dark: keeps re-entering [`Self::do_loop`]
    /// until `millis` have elapsed.
    pub fn delay(&mut self, millis: u64, driver: &mut dyn ServerDriver) {
        let start = Instant::now();
        let deadline = Duration::from_millis(millis);
        while start.elapsed() < deadline {
            self.do_loop(driver);
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn render_config_page(
        &mut self,
        data_arrived: bool,
        req: &mut dyn WebRequest,
    ) -> anyhow::Result<()> {
        log::info!("configuration page requested");

        // Chunked output instead of one page string, so many
        // parameters don't pile up in memory.
        req.send_header(header::CACHE_CONTROL.as_str(), "no-cache, no-store, must-revalidate");
        req.send_header(header::PRAGMA.as_str(), "no-cache");
        req.send_header(header::EXPIRES.as_str(), "-1");
        req.send(StatusCode::OK, "text/html; charset=UTF-8", "")?;

        let mut content = self.html.head().replace("{v}", &self.thing_name());
        content.push_str(&self.html.script());
        content.push_str(&self.html.style());
        content.push_str(&self.html.head_extension());
        content.push_str(&self.html.head_end());
        content.push_str(&self.html.form_start());
        req.send_content(&content)?;

        let system_html = self.system_params.lock().unwrap().render_html(data_arrived, &*req);
        req.send_content(&system_html)?;
        let custom_html = self.custom_groups.lock().unwrap().render_html(data_arrived, &*req);
        req.send_content(&custom_html)?;

        let mut content = self.html.form_end();
        if let Some(path) = &self.update_path {
            content.push_str(&self.html.update_link().replace("{u}", path));
        }
        content.push_str(&self.html.config_version().replace("{v}", &self.version));
        content.push_str(&self.html.end());
        req.send_content(&content)?;
        req.send_content("")?;
        req.stop();
        Ok(())
    }

    /// All checks always run so the re-rendered form shows every
    /// problem at once; the overall result is the AND of the external
    /// validator and each built-in check.
    fn validate_form(&mut self, req: &dyn WebRequest) -> bool {
        self.system_params.lock().unwrap().clear_error_message();
        self.custom_groups.lock().unwrap().clear_error_message();

        let mut valid = match self.form_validator.as_mut() {
            Some(validator) => validator(req),
            None => true,
        };

        let name_len = req.field_value(THING_NAME_ID).chars().count();
        if name_len < 3 {
            set_leaf_error(
                &self.thing_name_param,
                "Give a name with at least 3 characters.",
            );
            valid = false;
        }
        let password_len = req.field_value(AP_PASSWORD_ID).chars().count();
        // An empty password is valid: it keeps the stored one.
        if password_len > 0 && password_len < 8 {
            set_leaf_error(
                &self.ap_password_param,
                "Password length must be at least 8 characters.",
            );
            valid = false;
        }

        log::info!("form validation result: {}", valid);
        valid
    }
}

/// Host strings made of digits and dots are address literals and never
/// captive-portal redirected.
fn is_ip(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c == '.' || c.is_ascii_digit())
}

fn push_child(group: &NodeRef, child: NodeRef) {
    if let Some(g) = group.lock().unwrap().as_group_mut() {
        g.add_item(child);
    }
}

fn leaf_value(node: &NodeRef) -> String {
    node.lock()
        .unwrap()
        .as_item()
        .map(|p| p.value())
        .unwrap_or_default()
}

fn set_leaf_value(node: &NodeRef, value: &str) {
    if let Some(p) = node.lock().unwrap().as_item_mut() {
        p.set_value(value);
    }
}

fn set_leaf_error(node: &NodeRef, message: &str) {
    if let Some(p) = node.lock().unwrap().as_item_mut() {
        p.error_message = Some(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MemoryStore, MockRequest};

    fn portal() -> ConfigPortal {
        ConfigPortal::new("mything", "initial-pass", "v1.0")
    }

    fn leaf_error(node: &NodeRef) -> Option<String> {
        node.lock()
            .unwrap()
            .as_item()
            .and_then(|p| p.error_message.clone())
    }

    #[test]
    fn ip_literal_hosts_are_not_redirected() {
        let portal = portal();
        let mut req = MockRequest::new().with_host("192.168.4.1");
        assert!(!portal.handle_captive_portal(&mut req).unwrap());
        assert!(!req.stopped);
    }

    #[test]
    fn thing_name_prefix_hosts_are_not_redirected() {
        let portal = portal();
        let mut req = MockRequest::new().with_host("MyThing.local");
        assert!(!portal.handle_captive_portal(&mut req).unwrap());
    }

    #[test]
    fn foreign_hosts_are_redirected_and_closed() {
        let portal = portal();
        let mut req = MockRequest::new().with_host("evil.example.com");
        assert!(portal.handle_captive_portal(&mut req).unwrap());
        assert_eq!(req.status, Some(StatusCode::FOUND));
        assert_eq!(req.header("location"), Some("http://192.168.4.1"));
        assert!(req.stopped);
    }

    #[test]
    fn not_found_redirects_before_reporting() {
        let portal = portal();

        let mut req = MockRequest::new().with_host("evil.example.com").with_uri("/nothing");
        portal.handle_not_found(&mut req).unwrap();
        assert_eq!(req.status, Some(StatusCode::FOUND));

        let mut req = MockRequest::new().with_uri("/nothing");
        portal.handle_not_found(&mut req).unwrap();
        assert_eq!(req.status, Some(StatusCode::NOT_FOUND));
        assert!(req.body.contains("/nothing"));
    }

    #[test]
    fn unauthenticated_request_gets_a_challenge() {
        let mut portal = portal();
        let mut store = MemoryStore::new(256);
        let mut req = MockRequest::new().with_authorized(false);
        portal.handle_config(&mut req, &mut store).unwrap();
        assert!(req.auth_requested);
        assert!(req.status.is_none());
    }

    #[test]
    fn plain_request_renders_the_form() {
        let mut portal = portal();
        let mut store = MemoryStore::new(256);
        portal.init(&mut store);

        let mut req = MockRequest::new();
        portal.handle_config(&mut req, &mut store).unwrap();
        assert_eq!(req.status, Some(StatusCode::OK));
        assert!(req.body.contains("name=\"thingName\""));
        assert!(req.body.contains("name=\"apPassword\""));
        assert!(req.body.contains("name='configSave'"));
        assert!(req.body.contains("Firmware config version 'v1.0'"));
        assert!(req.stopped);
    }

    #[test]
    fn failing_checks_are_additive() {
        let mut portal = portal();
        let req = MockRequest::new()
            .with_field(THING_NAME_ID, "ab")
            .with_field(AP_PASSWORD_ID, "short");
        assert!(!portal.validate_form(&req));
        assert!(leaf_error(&portal.thing_name_param).is_some());
        assert!(leaf_error(&portal.ap_password_param).is_some());
    }

    #[test]
    fn thing_name_length_boundary() {
        let mut portal = portal();

        let req = MockRequest::new()
            .with_field(THING_NAME_ID, "abc")
            .with_field(AP_PASSWORD_ID, "");
        assert!(portal.validate_form(&req));

        let req = MockRequest::new()
            .with_field(THING_NAME_ID, "ab")
            .with_field(AP_PASSWORD_ID, "");
        assert!(!portal.validate_form(&req));
        assert!(leaf_error(&portal.ap_password_param).is_none());
    }

    #[test]
    fn ap_password_length_boundary() {
        let mut portal = portal();
        let valid_name = MockRequest::new().with_field(THING_NAME_ID, "mything");

        assert!(portal.validate_form(&valid_name));

        let req = MockRequest::new()
            .with_field(THING_NAME_ID, "mything")
            .with_field(AP_PASSWORD_ID, "1234567");
        assert!(!portal.validate_form(&req));

        let req = MockRequest::new()
            .with_field(THING_NAME_ID, "mything")
            .with_field(AP_PASSWORD_ID, "12345678");
        assert!(portal.validate_form(&req));
    }

    #[test]
    fn validation_reruns_clear_stale_errors() {
        let mut portal = portal();
        let bad = MockRequest::new().with_field(THING_NAME_ID, "ab");
        assert!(!portal.validate_form(&bad));
        assert!(leaf_error(&portal.thing_name_param).is_some());

        let good = MockRequest::new().with_field(THING_NAME_ID, "abc");
        assert!(portal.validate_form(&good));
        assert!(leaf_error(&portal.thing_name_param).is_none());
    }

    #[test]
    fn external_validator_runs_and_is_anded() {
        let mut portal = portal();
        portal.set_form_validator(Box::new(|_req| false));
        let req = MockRequest::new().with_field(THING_NAME_ID, "mything");
        assert!(!portal.validate_form(&req));
    }

    #[test]
    fn update_link_appears_only_when_configured() {
        let mut portal = portal();
        let mut store = MemoryStore::new(256);
        portal.init(&mut store);

        let mut req = MockRequest::new();
        portal.handle_config(&mut req, &mut store).unwrap();
        assert!(!req.body.contains("Firmware update"));

        portal.set_update_path("/firmware");
        let mut req = MockRequest::new();
        portal.handle_config(&mut req, &mut store).unwrap();
        assert!(req.body.contains("<a href='/firmware'>Firmware update</a>"));
    }

    #[test]
    fn status_reports_version_and_thing_name() {
        let portal = portal();
        let mut req = MockRequest::new();
        portal.handle_status(&mut req).unwrap();
        assert_eq!(req.content_type, "application/json");
        assert!(req.body.contains("\"version\":\"v1.0\""));
        assert!(req.body.contains("\"thing_name\":\"mything\""));
    }

    #[test]
    fn delay_keeps_driving_the_server() {
        struct CountingDriver {
            dns: u32,
            http: u32,
        }
        impl ServerDriver for CountingDriver {
            fn process_dns(&mut self) {
                self.dns += 1;
            }
            fn handle_client(&mut self) {
                self.http += 1;
            }
        }

        let mut portal = portal();
        let mut driver = CountingDriver { dns: 0, http: 0 };
        portal.delay(30, &mut driver);
        assert!(driver.dns >= 2);
        assert_eq!(driver.dns, driver.http);
    }

    #[test]
    fn is_ip_accepts_dotted_digits_only() {
        assert!(is_ip("192.168.4.1"));
        assert!(is_ip("10.0.0.1"));
        assert!(!is_ip("mything.local"));
        assert!(!is_ip("evil.example.com"));
        assert!(!is_ip(""));
    }
}
