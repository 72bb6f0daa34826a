//! Index page fixtures, mock endpoints and a plain-text extractor

use std::path::Path;

use async_trait::async_trait;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use unsc_ingest::{Result, TextExtractor};

/// Cookie handed out by the mock login endpoint
pub const SESSION_COOKIE: &str = "DomAuthSessId=3F2A9C";

/// Veto table listing the revision of S/18087
pub const VETO_TABLE: &str = r#"<html><body>
<table>
  <tr><th>Date</th><th>Draft</th><th>Meeting record</th><th>Agenda item</th><th>Negative vote</th></tr>
  <tr><td colspan="5">Library notice</td></tr>
  <tr>
    <td>21 April 1986</td>
    <td><a href="/en/S/18087/Rev.1">S/18087/Rev.1</a></td>
    <td><a href="/en/S/PV.2686">S/PV.2686</a></td>
    <td>Libyan Arab Jamahiriya</td>
    <td>France<br>United Kingdom<br>United States</td>
  </tr>
</table>
</body></html>"#;

/// Cross-reference export mapping S/RES/580 (1986) to its draft
pub const CROSS_REFERENCE: &str = "S/RES/580(1986)\tS/18000\t30 December 1986\n\
S/RES/581(1986)\tS/18001\t13 February 1986\n";

/// 1986 meeting table: one veto meeting, one adoption meeting, one meeting
/// without any document id
pub fn meeting_table_1986(base: &str) -> String {
    format!(
        r#"<html><body>
<table>
  <tr><th>Meeting record</th><th>Date</th><th>Topic</th><th>Outcome</th></tr>
  <tr>
    <td><a href="{base}/en/S/PV.2686">S/PV.2686</a></td>
    <td>21 April</td>
    <td>Libyan Arab Jamahiriya</td>
    <td>S/18087 vetoed by France, United Kingdom, United States</td>
  </tr>
  <tr>
    <td><a href="{base}/en/S/PV.2700">S/PV.2700</a></td>
    <td>30 December</td>
    <td>Lebanon</td>
    <td>S/RES/580 (1986) adopted unanimously. S/18100 not adopted</td>
  </tr>
  <tr>
    <td><a href="{base}/en/S/PV.2701">S/PV.2701</a></td>
    <td>31 December</td>
    <td>Adoption of the agenda</td>
    <td>Statement by the President</td>
  </tr>
</table>
</body></html>"#
    )
}

/// Web page carrying a meta-refresh directive to `target`
pub fn refresh_page(target: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!(
            r#"<html><head><META HTTP-EQUIV="refresh" CONTENT="1; URL={target}"></head><body></body></html>"#
        ),
        "text/html",
    )
}

/// PDF response whose body names the requested path
pub fn echo_document(request: &Request) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("%PDF text of {}", request.url.path()),
        "application/pdf",
    )
}

/// Login endpoint that answers with a redirect and a session cookie
pub async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/welcome")
                .insert_header("Set-Cookie", format!("{}; path=/", SESSION_COOKIE)),
        )
        .mount(server)
        .await;
}

/// Every document under `/en/` served directly as a PDF
pub async fn mount_documents(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/en/.+"))
        .respond_with(echo_document)
        .mount(server)
        .await;
}

/// Index pages for 1986 and the veto table
pub async fn mount_index(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/resguide/scact1986_table_en.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(meeting_table_1986(&server.uri()), "text/html"),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/resguide/scact_veto_table_en.htm"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(VETO_TABLE, "text/html"))
        .mount(server)
        .await;
}

/// Treats every downloaded file as UTF-8 text
pub struct PlainText;

#[async_trait]
impl TextExtractor for PlainText {
    async fn extract_text(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
