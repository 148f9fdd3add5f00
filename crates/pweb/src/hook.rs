//! Browser-side request hook.
//!
//! The generated script wraps `fetch` and `XMLHttpRequest.prototype.open` so
//! that requests a proxied page issues to other origins are sent back through
//! `<mount path>?url=<absolute url>`. The client URL matcher decides per URL:
//! `1` rewrites, `0` leaves the URL alone, `-1` drops the request.

use crate::matcher::ClientUrlMatcher;

const TEMPLATE: &str = r#"((window) => {
  const ns = __PWEB_NS__;
  const XHR = window.XMLHttpRequest;
  if (window[ns + "fetch"] || (XHR && XHR.prototype[ns + "open"])) {
    return;
  }
  const urlMatcher = __PWEB_MATCHER__;
  const urlReplacer = (url) =>
    ns + "?url=" + encodeURIComponent(url.protocol + "//" + url.host + url.pathname + url.search);
  const toUrl = (input) => {
    if (input instanceof URL) {
      return input;
    }
    try {
      return new URL(String(input), window.location.href);
    } catch (e) {
      return null;
    }
  };
  const getValidUrl = (input) => {
    const url = toUrl(input);
    if (url === null || url.origin === window.location.origin) {
      return input;
    }
    if (url.protocol !== "http:" && url.protocol !== "https:") {
      return input;
    }
    let decision;
    try {
      decision = Number(urlMatcher(url));
    } catch (e) {
      return input;
    }
    if (decision > 0) {
      return urlReplacer(url);
    }
    if (decision < 0) {
      return null;
    }
    return input;
  };
  window[ns] = { urlMatcher, urlReplacer, getValidUrl };

  const originalFetch = window.fetch;
  if (typeof originalFetch === "function") {
    window[ns + "fetch"] = originalFetch;
    window.fetch = function (...args) {
      const input = args[0];
      const isRequest = typeof Request !== "undefined" && input instanceof Request;
      const target = getValidUrl(isRequest ? input.url : input);
      if (target === null) {
        return new Promise(() => {});
      }
      if (isRequest) {
        if (target !== input.url) {
          args[0] = new Request(target, input);
        }
      } else {
        args[0] = target;
      }
      return originalFetch.apply(window, args);
    };
  }

  if (XHR && XHR.prototype) {
    const originalOpen = XHR.prototype.open;
    XHR.prototype[ns + "open"] = originalOpen;
    XHR.prototype.open = function (...args) {
      const target = getValidUrl(args[1]);
      if (target === null) {
        this.send = () => {};
        this.setRequestHeader = () => {};
        return;
      }
      args[1] = target;
      return originalOpen.apply(this, args);
    };
  }
})(window);
"#;

/// Generator for the request hook script.
#[derive(Debug, Clone)]
pub struct HookScript<'a> {
    mount_path: &'a str,
    matcher: &'a ClientUrlMatcher,
}

impl<'a> HookScript<'a> {
    pub fn new(mount_path: &'a str, matcher: &'a ClientUrlMatcher) -> Self {
        Self {
            mount_path,
            matcher,
        }
    }

    /// The script source.
    ///
    /// The mount path doubles as the namespace of the installation marker, so
    /// two proxies with different mount paths do not mask each other.
    pub fn render(&self) -> String {
        TEMPLATE
            .replace("__PWEB_NS__", &js_string(self.mount_path))
            .replace("__PWEB_MATCHER__", self.matcher.source().trim())
    }

    /// The script wrapped in a `<script>` element, ready to prepend to a page.
    pub fn html(&self) -> String {
        format!("<script>{}</script>", escape_script_close(&self.render()))
    }
}

/// JSON string literal, safe to embed inside an HTML `<script>` element.
fn js_string(value: &str) -> String {
    serde_json::Value::from(value)
        .to_string()
        .replace("</", "<\\/")
}

/// `</script` can only occur in string, regex or comment context in valid
/// code, where `<\/script` means the same thing.
fn escape_script_close(source: &str) -> String {
    let lower = source.to_ascii_lowercase();
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for (idx, _) in lower.match_indices("</script") {
        out.push_str(&source[last..idx + 1]);
        out.push('\\');
        last = idx + 1;
    }
    out.push_str(&source[last..]);
    out
}
