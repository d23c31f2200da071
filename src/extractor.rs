use crate::error::{Error, Result};
use log::warn;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// Output schema of the JSON search export, in column order.
pub const CSV_COLUMNS: [&str; 12] = [
    "ID",
    "FirstName",
    "LastName",
    "Email",
    "Age",
    "Sex",
    "CountryName",
    "RegionName",
    "CityName",
    "AvatarURL",
    "LastVisit",
    "AuID",
];

/// Columns echoed to the log for every exported profile.
pub const LOG_COLUMNS: [&str; 8] = [
    "ID",
    "FirstName",
    "LastName",
    "Email",
    "Age",
    "CountryName",
    "RegionName",
    "CityName",
];

pub const LISTING_COLUMNS: [&str; 3] = ["email", "bio_info", "geo_info"];

/// Mail domains that appear in profile links without their `.ru`.
const SHORT_DOMAINS: [&str; 4] = ["mail", "inbox", "list", "bk"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: String,
    pub sex: String,
    pub country_name: String,
    pub region_name: String,
    pub city_name: String,
    pub avatar_url: String,
    pub last_visit: String,
    pub au_id: String,
}

impl Profile {
    /// Missing fields come out empty; the record itself is always kept.
    pub fn from_value(user: &Value) -> Self {
        let text = |key: &str| user.get(key).map(value_text).unwrap_or_default();
        Profile {
            id: text("ID"),
            first_name: text("FirstName"),
            last_name: text("LastName"),
            email: text("Email"),
            age: text("Age"),
            sex: text("Sex"),
            country_name: text("CountryName"),
            region_name: text("RegionName"),
            city_name: text("CityName"),
            avatar_url: text("AvatarURL"),
            last_visit: text("LastVisit"),
            au_id: text("AuID"),
        }
    }

    pub fn field(&self, column: &str) -> &str {
        match column {
            "ID" => &self.id,
            "FirstName" => &self.first_name,
            "LastName" => &self.last_name,
            "Email" => &self.email,
            "Age" => &self.age,
            "Sex" => &self.sex,
            "CountryName" => &self.country_name,
            "RegionName" => &self.region_name,
            "CityName" => &self.city_name,
            "AvatarURL" => &self.avatar_url,
            "LastVisit" => &self.last_visit,
            "AuID" => &self.au_id,
            _ => "",
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        CSV_COLUMNS.iter().map(|c| self.field(c).to_string()).collect()
    }

    pub fn log_line(&self) -> String {
        LOG_COLUMNS
            .iter()
            .map(|c| self.field(c))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One decoded page of search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPage {
    pub records: Vec<Profile>,
    pub total: u64,
    pub offset: u64,
}

impl ResultPage {
    pub fn from_payload(payload: &Value, offset: u64) -> Result<Self> {
        let object = payload
            .as_object()
            .ok_or_else(|| Error::Decode(format!("search payload is not an object: {}", payload)))?;

        let total = match object.get("total") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| Error::Decode("search payload has no usable total".to_string()))?;

        let records = match object.get("users") {
            Some(Value::Array(users)) => users.iter().map(Profile::from_value).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(Error::Decode(format!("users is not a list: {}", other)));
            }
        };

        Ok(ResultPage {
            records,
            total,
            offset,
        })
    }
}

/// Unwraps the `[_, _, payload]` envelope of the ajax endpoint. A body that is
/// not JSON but carries `flood_marker` is flood control.
pub fn decode_ajax_payload(body: &str, flood_marker: Option<&str>) -> Result<Value> {
    let envelope: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            if let Some(marker) = flood_marker {
                if body.contains(marker) {
                    return Err(Error::FloodControl);
                }
            }
            return Err(Error::Decode(e.to_string()));
        }
    };

    envelope
        .as_array()
        .and_then(|items| items.get(2))
        .cloned()
        .ok_or_else(|| Error::Decode("ajax response has no payload element".to_string()))
}

/// A profile card from the mobile people listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub email: String,
    pub bio_info: String,
    pub geo_info: String,
}

impl ListingEntry {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.email.clone(),
            self.bio_info.clone(),
            self.geo_info.clone(),
        ]
    }
}

pub struct Extractor {
    link_selector: Selector,
    title_selector: Selector,
    info_selector: Selector,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor {
    pub fn new() -> Self {
        Extractor {
            link_selector: Selector::parse("a.list-item__link").unwrap(),
            title_selector: Selector::parse("span.list-item__title").unwrap(),
            info_selector: Selector::parse("span.list-item__info").unwrap(),
        }
    }

    /// Number of profile links on a listing page, usable entries or not.
    pub fn parse_listing(&self, html: &str) -> (usize, Vec<ListingEntry>) {
        let document = Html::parse_document(html);
        let links: Vec<ElementRef> = document.select(&self.link_selector).collect();
        let entries = links
            .iter()
            .filter_map(|link| self.listing_entry(link))
            .collect();
        (links.len(), entries)
    }

    fn listing_entry(&self, link: &ElementRef) -> Option<ListingEntry> {
        let href = link.value().attr("href")?;
        let email = match email_from_profile_link(href) {
            Some(email) => email,
            None => {
                warn!("Skipping profile link with unexpected shape: {}", href);
                return None;
            }
        };
        Some(ListingEntry {
            email,
            bio_info: self.child_text(link, &self.title_selector),
            geo_info: self.child_text(link, &self.info_selector),
        })
    }

    fn child_text(&self, link: &ElementRef, selector: &Selector) -> String {
        link.select(selector)
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    }
}

/// `/mail/ivan/` → `ivan@mail.ru`, `/gmail.com/ivan/` → `ivan@gmail.com`.
pub fn email_from_profile_link(href: &str) -> Option<String> {
    let mut parts = href.split('/').skip(1);
    let domain = parts.next().filter(|d| !d.is_empty())?;
    let username = parts.next().filter(|u| !u.is_empty())?;
    if SHORT_DOMAINS.contains(&domain) {
        Some(format!("{}@{}.ru", username, domain))
    } else {
        Some(format!("{}@{}", username, domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_keeps_record_with_missing_fields() {
        let profile = Profile::from_value(&json!({"ID": 42, "FirstName": "Ivan", "Age": null}));
        assert_eq!(
            profile.to_row(),
            vec!["42", "Ivan", "", "", "", "", "", "", "", "", "", ""]
        );
    }

    #[test]
    fn log_line_uses_preview_columns() {
        let profile = Profile::from_value(&json!({
            "ID": "7", "FirstName": "Anna", "LastName": "K", "Email": "anna@mail.ru",
            "Age": 30, "Sex": "f", "CountryName": "Россия", "RegionName": "", "CityName": "Москва"
        }));
        assert_eq!(profile.log_line(), "7 Anna K anna@mail.ru 30 Россия  Москва");
    }

    #[test]
    fn page_total_accepts_numeric_strings() {
        let page = ResultPage::from_payload(&json!({"total": "23", "users": [{}]}), 10).unwrap();
        assert_eq!(page.total, 23);
        assert_eq!(page.offset, 10);
        assert_eq!(page.records.len(), 1);
    }

    #[test]
    fn page_without_total_is_a_decode_error() {
        let result = ResultPage::from_payload(&json!({"users": []}), 0);
        assert!(matches!(result, Err(Error::Decode(_))));
        let denied = ResultPage::from_payload(&json!("https://auth.mail.ru/sdc?fail="), 0);
        assert!(matches!(denied, Err(Error::Decode(_))));
    }

    #[test]
    fn ajax_envelope_is_unwrapped() {
        let payload = decode_ajax_payload(r#"["AjaxResponse","OK",{"total":1}]"#, None).unwrap();
        assert_eq!(payload, json!({"total": 1}));
        assert!(matches!(
            decode_ajax_payload(r#"["AjaxResponse"]"#, None),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn flood_page_is_classified() {
        let body = "<html>Too many requests, see https://help.mail.ru/my/access/unban/</html>";
        let marker = "https://help.mail.ru/my/access/unban/";
        assert!(matches!(
            decode_ajax_payload(body, Some(marker)),
            Err(Error::FloodControl)
        ));
        assert!(matches!(decode_ajax_payload(body, None), Err(Error::Decode(_))));
        assert!(matches!(
            decode_ajax_payload("<html>oops</html>", Some(marker)),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn profile_links_become_addresses() {
        assert_eq!(email_from_profile_link("/mail/ivan/").as_deref(), Some("ivan@mail.ru"));
        assert_eq!(email_from_profile_link("/bk/olga").as_deref(), Some("olga@bk.ru"));
        assert_eq!(
            email_from_profile_link("/yandex.ru/petr/").as_deref(),
            Some("petr@yandex.ru")
        );
        assert_eq!(email_from_profile_link("/mail/"), None);
    }

    #[test]
    fn listing_page_is_parsed() {
        let html = r#"
            <div>
              <a class="list-item__link" href="/mail/ivan/">
                <span class="list-item__title">Иван Петров, 30 лет</span>
                <span class="list-item__info">Москва</span>
              </a>
              <a class="list-item__link" href="/inbox/masha/">
                <span class="list-item__title">Маша</span>
              </a>
              <a class="other" href="/mail/skip/">not a result</a>
            </div>"#;
        let (count, entries) = Extractor::new().parse_listing(html);
        assert_eq!(count, 2);
        assert_eq!(
            entries,
            vec![
                ListingEntry {
                    email: "ivan@mail.ru".into(),
                    bio_info: "Иван Петров, 30 лет".into(),
                    geo_info: "Москва".into(),
                },
                ListingEntry {
                    email: "masha@inbox.ru".into(),
                    bio_info: "Маша".into(),
                    geo_info: String::new(),
                },
            ]
        );
    }
}
