// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Login and consent pages
//!
//! Plain HTML forms. Every interpolated value goes through [`escape_html`].

use super::{AuthorizeParams, ValidatedAuthorize};

const STYLE: &str = "body{font-family:sans-serif;max-width:28rem;margin:4rem auto;padding:0 1rem}\
label,input,button{display:block;width:100%;margin:.4rem 0}\
.error{color:#b00020}.actions{display:flex;gap:.5rem}";

/// Escape text for use in HTML element content and attribute values
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn hidden(name: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
            name,
            escape_html(value)
        ),
        None => String::new(),
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title>\
         <style>{}</style></head><body>{}</body></html>",
        escape_html(title),
        STYLE,
        body
    )
}

fn param_fields(params: &AuthorizeParams) -> String {
    [
        hidden("client_id", params.client_id.as_deref()),
        hidden("redirect_uri", params.redirect_uri.as_deref()),
        hidden("code_challenge", params.code_challenge.as_deref()),
        hidden("code_challenge_method", params.code_challenge_method.as_deref()),
        hidden("state", params.state.as_deref()),
        hidden("scope", params.scope.as_deref()),
    ]
    .concat()
}

/// Login form that carries the pending authorize request
pub fn login_page(params: &AuthorizeParams, error: Option<&str>) -> String {
    let error = error
        .map(|e| format!("<p class=\"error\">{}</p>", escape_html(e)))
        .unwrap_or_default();

    let client = params.client_id.as_deref().unwrap_or("an application");
    page(
        "Sign in",
        &format!(
            "<h1>Sign in</h1><p>Sign in to continue to <strong>{}</strong>.</p>{}\
             <form method=\"post\" action=\"/oauth/login\">{}\
             <label for=\"username\">Username</label>\
             <input id=\"username\" name=\"username\" autocomplete=\"username\" required>\
             <label for=\"password\">Password</label>\
             <input id=\"password\" name=\"password\" type=\"password\" autocomplete=\"current-password\" required>\
             <button type=\"submit\">Sign in</button></form>",
            escape_html(client),
            error,
            param_fields(params)
        ),
    )
}

/// Consent form posting to approve or deny
pub fn consent_page(request: &ValidatedAuthorize, username: &str, csrf_token: &str) -> String {
    let params = request.to_params();
    let scope = request
        .scope
        .as_deref()
        .map(|s| format!("<p>Requested scope: <code>{}</code></p>", escape_html(s)))
        .unwrap_or_default();

    let fields = format!("{}{}", param_fields(&params), hidden("csrf_token", Some(csrf_token)));

    page(
        "Authorize application",
        &format!(
            "<h1>Authorize {client}</h1>\
             <p>Signed in as <strong>{user}</strong>.</p>\
             <p><strong>{client}</strong> is requesting access to its storage namespace.</p>{scope}\
             <div class=\"actions\">\
             <form method=\"post\" action=\"/oauth/authorize/approve\">{fields}\
             <button type=\"submit\">Approve</button></form>\
             <form method=\"post\" action=\"/oauth/authorize/deny\">{fields}\
             <button type=\"submit\">Deny</button></form></div>",
            client = escape_html(&request.client_id),
            user = escape_html(username),
            scope = scope,
            fields = fields
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">'&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_login_page_escapes_params() {
        let params = AuthorizeParams {
            client_id: Some("acme-app".to_string()),
            state: Some("\"><script>alert(1)</script>".to_string()),
            ..AuthorizeParams::default()
        };
        let html = login_page(&params, Some("Invalid username or password"));

        assert!(html.contains("action=\"/oauth/login\""));
        assert!(html.contains("name=\"client_id\" value=\"acme-app\""));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Invalid username or password"));
    }
}
