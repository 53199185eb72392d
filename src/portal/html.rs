//! Embedded HTML fragments for the config page.
//!
//! The controller only concatenates these and substitutes the `{v}`
//! (title / config version) and `{u}` (firmware update path)
//! placeholders; swap in a custom [`HtmlFormatProvider`] for different
//! branding.

const HTML_HEAD: &str = "<!DOCTYPE html><html lang=\"en\"><head><meta name=\"viewport\" \
     content=\"width=device-width, initial-scale=1, user-scalable=no\"/><title>{v}</title>\n";

const HTML_STYLE_INNER: &str = ".de{background-color:#ffaaaa;} \
     .em{font-size:0.8em;color:#bb0000;padding-bottom:0px;} \
     .c{text-align:center;} div,input,select{padding:5px;font-size:1em;} input{width:95%;} \
     select{width:100%} body{text-align:center;font-family:verdana;} \
     button{border:0;border-radius:0.3rem;background-color:#16A1E7;color:#fff;\
     line-height:2.4rem;font-size:1.2rem;width:100%;} \
     fieldset{border-radius:0.3rem;margin:0px;}\n";

const HTML_SCRIPT_INNER: &str = "function pw(id){var x=document.getElementById(id);\
     if(x.type==='password'){x.type='text';}else{x.type='password';}};";

const HTML_HEAD_END: &str = "</head><body>";

const HTML_BODY_INNER: &str =
    "<div style='text-align:left;display:inline-block;min-width:260px;'>\n";

const HTML_FORM_START: &str =
    "<form action='' method='post'><input type='hidden' name='configSave' value='true'>\n";

const HTML_FORM_END: &str =
    "<button type='submit' style='margin-top: 10px;'>Apply</button></form>\n";

const HTML_SAVED: &str =
    "<div>Configuration saved<br />Return to <a href='/'>home page</a>.</div>\n";

const HTML_END: &str = "</div></body></html>";

const HTML_UPDATE: &str =
    "<div style='padding-top:25px;'><a href='{u}'>Firmware update</a></div>\n";

const HTML_CONFIG_VER: &str =
    "<div style='font-size: .6em;'>Firmware config version '{v}'</div>\n";

/// Static page segments around the rendered parameter inputs. Every
/// method has a default, so a custom provider only overrides what it
/// wants to change.
pub trait HtmlFormatProvider {
    fn head(&self) -> String {
        HTML_HEAD.to_string()
    }
    fn style(&self) -> String {
        format!("<style>{}</style>", HTML_STYLE_INNER)
    }
    fn script(&self) -> String {
        format!("<script>{}</script>", HTML_SCRIPT_INNER)
    }
    fn head_extension(&self) -> String {
        String::new()
    }
    fn head_end(&self) -> String {
        format!("{}{}", HTML_HEAD_END, HTML_BODY_INNER)
    }
    fn form_start(&self) -> String {
        HTML_FORM_START.to_string()
    }
    fn form_end(&self) -> String {
        HTML_FORM_END.to_string()
    }
    fn form_saved(&self) -> String {
        HTML_SAVED.to_string()
    }
    fn end(&self) -> String {
        HTML_END.to_string()
    }
    fn update_link(&self) -> String {
        HTML_UPDATE.to_string()
    }
    fn config_version(&self) -> String {
        HTML_CONFIG_VER.to_string()
    }
}

/// The built-in look.
pub struct DefaultHtmlProvider;

impl HtmlFormatProvider for DefaultHtmlProvider {}
