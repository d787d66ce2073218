//! JavaScript evaluated inside the MGM page.
//!
//! Every script resolves to a plain JSON object so the result can be
//! returned by value.

use crate::config::SourceConfig;

/// Reads the AngularJS controller scope.
///
/// Field names differ between page versions, so each slot tries every
/// known alias.
pub const SCOPE_SCRIPT: &str = r#"(() => {
    const el = document.querySelector('[ng-controller]');
    const scope = (el && window.angular) ? window.angular.element(el).scope() : null;
    if (!scope) {
        return { found: false, current: null, hourly: null, daily: null };
    }
    const pick = (...names) => {
        for (const name of names) {
            if (scope[name] !== undefined && scope[name] !== null) {
                return JSON.parse(JSON.stringify(scope[name]));
            }
        }
        return null;
    };
    return {
        found: true,
        current: pick('sondurum', 'sonDurum'),
        hourly: pick('tahmin', 'saatlikTahmin'),
        daily: pick('gunlukTahmin', 'gunluktahmin'),
    };
})()"#;

/// CSS selectors for the current-conditions widgets.
pub const TEMPERATURE_SELECTOR: &str = ".anlik-sicaklik-deger";
pub const HUMIDITY_SELECTOR: &str = ".anlik-nem-deger-kac";
pub const CONDITION_SELECTOR: &str = ".anlik-durum-hadise";

/// Reads visible text of the current-conditions widgets.
pub fn dom_script() -> String {
    format!(
        r#"(() => {{
    const text = (sel) => {{
        const el = document.querySelector(sel);
        if (!el) return null;
        const value = (el.innerText || el.textContent || '').trim();
        return value.length > 0 ? value : null;
    }};
    return {{
        sicaklik: text({temp}),
        nem: text({hum}),
        hadise: text({cond}),
    }};
}})()"#,
        temp = js_string(TEMPERATURE_SELECTOR),
        hum = js_string(HUMIDITY_SELECTOR),
        cond = js_string(CONDITION_SELECTOR),
    )
}

/// Fetches the three API endpoints concurrently from the page's origin.
///
/// A failed request or non-JSON body yields `null` for that slot only.
pub fn direct_fetch_script(source: &SourceConfig) -> String {
    format!(
        r#"(async () => {{
    const get = (url) => fetch(url, {{ headers: {{ 'Accept': 'application/json' }} }})
        .then((r) => r.ok ? r.json() : null)
        .catch(() => null);
    const [current, hourly, daily] = await Promise.all([
        get({current}),
        get({hourly}),
        get({daily}),
    ]);
    return {{ current, hourly, daily }};
}})()"#,
        current = js_string(&source.current_url()),
        hourly = js_string(&source.hourly_url()),
        daily = js_string(&source.daily_url()),
    )
}

/// True when `selector` exists and has non-empty text.
pub fn selector_has_text_script(selector: &str) -> String {
    format!(
        r#"(() => {{
    const el = document.querySelector({sel});
    return !!el && (el.innerText || el.textContent || '').trim().length > 0;
}})()"#,
        sel = js_string(selector)
    )
}

/// Quote a value as a JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
