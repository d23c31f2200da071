use crate::config::{Config, Endpoints};
use crate::delay_manager::Sleeper;
use crate::error::{Error, Result};
use crate::extractor::{decode_ajax_payload, Profile, ResultPage, CSV_COLUMNS};
use crate::http_client::Transport;
use crate::result_sink::{LineEnding, ResultSink};
use crate::retry::{run_with_retry, RetryPolicies};
use log::{debug, info};
use serde_json::Value;
use std::path::Path;

/// Optional location filters, sent with every page request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoFilter {
    pub country: Option<u64>,
    pub region: Option<u64>,
    pub city: Option<u64>,
}

impl GeoFilter {
    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.region.is_none() && self.city.is_none()
    }

    fn query_args(&self) -> String {
        let mut args = String::new();
        if let Some(country) = self.country {
            args.push_str(&format!("&arg_countryid={}", country));
        }
        if let Some(region) = self.region {
            args.push_str(&format!("&arg_region={}", region));
        }
        if let Some(city) = self.city {
            args.push_str(&format!("&arg_cityid={}", city));
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub name: String,
    pub filter: GeoFilter,
}

impl SearchQuery {
    pub fn new(name: impl Into<String>) -> Self {
        SearchQuery {
            name: name.into(),
            filter: GeoFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: GeoFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn url(&self, endpoints: &Endpoints, offset: u64) -> String {
        format!(
            "{}?&ajax_call=1&func_name=search.get&arg_name={}&arg_offset={}{}",
            endpoints.ajax_url,
            urlencoding::encode(&self.name),
            offset,
            self.filter.query_args()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSummary {
    /// Matches reported by the upstream.
    pub total: u64,
    pub pages: u64,
    pub written: u64,
}

pub struct SearchEngine<'a, T: Transport> {
    transport: &'a T,
    config: &'a Config,
    endpoints: &'a Endpoints,
    sleeper: &'a dyn Sleeper,
    policies: RetryPolicies,
}

impl<'a, T: Transport> SearchEngine<'a, T> {
    pub fn new(
        transport: &'a T,
        config: &'a Config,
        endpoints: &'a Endpoints,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        SearchEngine {
            transport,
            config,
            endpoints,
            sleeper,
            policies: RetryPolicies::from_config(config),
        }
    }

    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Raw payload element of a search response, retried until decodable.
    pub fn fetch_payload(&self, query: &SearchQuery, offset: u64) -> Result<Value> {
        let url = query.url(self.endpoints, offset);
        let operation = format!("search offset {}", offset);
        run_with_retry(&self.policies, self.sleeper, &operation, || {
            let resp = self.transport.get(&url)?;
            decode_ajax_payload(&resp.body, Some(&self.endpoints.flood_marker))
        })
    }

    pub fn fetch_page(&self, query: &SearchQuery, offset: u64) -> Result<ResultPage> {
        info!("offset {}", offset);
        let url = query.url(self.endpoints, offset);
        let operation = format!("search offset {}", offset);
        run_with_retry(&self.policies, self.sleeper, &operation, || {
            let resp = self.transport.get(&url)?;
            let payload = decode_ajax_payload(&resp.body, Some(&self.endpoints.flood_marker))?;
            if payload.as_str() == Some(self.endpoints.denied_payload.as_str()) {
                return Err(Error::AccessDenied);
            }
            ResultPage::from_payload(&payload, offset)
        })
    }

    /// Pages of one run. The first call learns the total, which bounds the run.
    pub fn pages<'e>(&'e self, query: &'e SearchQuery) -> Pages<'e, 'a, T> {
        Pages {
            engine: self,
            query,
            next_offset: 0,
            cap: None,
            first: None,
            done: false,
        }
    }

    /// Runs the query to completion, writing every page to `output` as it arrives.
    pub fn search(&self, query: &SearchQuery, output: &Path) -> Result<SearchSummary> {
        let mut sink = ResultSink::create(output, &CSV_COLUMNS, LineEnding::Crlf)?;
        let summary = self.search_into(query, &mut sink)?;
        info!("search \"{}\" done", query.name);
        Ok(summary)
    }

    pub fn search_into(&self, query: &SearchQuery, sink: &mut ResultSink) -> Result<SearchSummary> {
        let mut summary = SearchSummary::default();
        let mut pages = self.pages(query);

        while let Some(page) = pages.next() {
            let page = page?;
            summary.total = page.total;
            summary.pages += 1;

            let cap = pages.effective_cap().unwrap_or(0);
            let room = cap.saturating_sub(summary.written) as usize;
            let records = &page.records[..page.records.len().min(room)];
            if records.len() < page.records.len() {
                debug!(
                    "Cap {} reached, dropping {} records of offset {}",
                    cap,
                    page.records.len() - records.len(),
                    page.offset
                );
            }

            let written = sink.append(records.iter().map(Profile::to_row))?;
            for record in records {
                info!("{}", record.log_line());
            }
            summary.written += written as u64;
        }

        Ok(summary)
    }
}

pub struct Pages<'e, 'a, T: Transport> {
    engine: &'e SearchEngine<'a, T>,
    query: &'e SearchQuery,
    next_offset: u64,
    cap: Option<u64>,
    first: Option<ResultPage>,
    done: bool,
}

impl<T: Transport> Pages<'_, '_, T> {
    /// `min(max_results, total)` once the first page is in.
    pub fn effective_cap(&self) -> Option<u64> {
        self.cap
    }

    fn fail(&mut self, err: Error) -> Option<Result<ResultPage>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<T: Transport> Iterator for Pages<'_, '_, T> {
    type Item = Result<ResultPage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let cap = match self.cap {
            Some(cap) => cap,
            None => {
                let first = match self.engine.fetch_page(self.query, 0) {
                    Ok(page) => page,
                    Err(e) => return self.fail(e),
                };
                info!("Found {} profiles", first.total);
                let cap = first.total.min(self.engine.config.max_results);
                self.cap = Some(cap);
                self.first = Some(first);
                cap
            }
        };

        if self.next_offset >= cap {
            self.done = true;
            return None;
        }

        let offset = self.next_offset;
        self.next_offset += self.engine.config.page_size.max(1);

        if offset == 0 {
            if let Some(first) = self.first.take() {
                return Some(Ok(first));
            }
        }

        self.engine.sleeper.sleep(self.engine.config.delay);
        match self.engine.fetch_page(self.query, offset) {
            Ok(page) => Some(Ok(page)),
            Err(e) => self.fail(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay_manager::RecordingSleeper;
    use crate::retry::RetryPolicy;
    use crate::test_support::{network_error, ok, ScriptedTransport};
    use serde_json::json;
    use std::fs;
    use std::time::Duration;

    fn page_body(total: u64, ids: std::ops::Range<u64>) -> String {
        let users: Vec<Value> = ids
            .map(|id| json!({"ID": id, "FirstName": format!("user{}", id), "Email": format!("u{}@mail.ru", id)}))
            .collect();
        json!(["AjaxResponse", "OK", {"total": total, "users": users}]).to_string()
    }

    fn script_pages(transport: &ScriptedTransport, endpoints: &Endpoints, query: &SearchQuery, total: u64, page_size: u64, upto: u64) {
        let mut offset = 0;
        while offset < upto {
            let end = (offset + page_size).min(total);
            transport.on(&query.url(endpoints, offset), ok("https://my.mail.ru/", &page_body(total, offset..end)));
            offset += page_size;
        }
    }

    fn data_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn url_carries_encoded_name_and_filters() {
        let endpoints = Endpoints::default();
        let query = SearchQuery::new("Иван Петров").with_filter(GeoFilter {
            country: Some(24),
            region: None,
            city: Some(25),
        });
        assert_eq!(
            query.url(&endpoints, 20),
            "https://my.mail.ru/cgi-bin/my/ajax?&ajax_call=1&func_name=search.get\
             &arg_name=%D0%98%D0%B2%D0%B0%D0%BD%20%D0%9F%D0%B5%D1%82%D1%80%D0%BE%D0%B2\
             &arg_offset=20&arg_countryid=24&arg_cityid=25"
        );
    }

    #[test]
    fn small_result_set_fetches_each_page_once() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let config = Config::default();
        let endpoints = Endpoints::default();
        let transport = ScriptedTransport::new();
        let sleeper = RecordingSleeper::new();
        let query = SearchQuery::new("ivan");
        script_pages(&transport, &endpoints, &query, 23, 10, 23);

        let engine = SearchEngine::new(&transport, &config, &endpoints, &sleeper);
        let summary = engine.search(&query, &output).unwrap();

        assert_eq!(summary, SearchSummary { total: 23, pages: 3, written: 23 });
        assert_eq!(transport.requests().len(), 3);
        for offset in [0, 10, 20] {
            assert_eq!(transport.request_count(&query.url(&endpoints, offset)), 1);
        }
        let lines = data_lines(&output);
        assert_eq!(lines.len(), 24);
        assert_eq!(lines[0], CSV_COLUMNS.join(";"));
        assert!(lines[1].starts_with("0;user0;;u0@mail.ru;"));
        assert_eq!(sleeper.waits(), vec![config.delay; 2]);
    }

    #[test]
    fn large_result_set_stops_at_cap() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let config = Config {
            max_results: 25,
            ..Config::default()
        };
        let endpoints = Endpoints::default();
        let transport = ScriptedTransport::new();
        let sleeper = RecordingSleeper::new();
        let query = SearchQuery::new("ivan");
        script_pages(&transport, &endpoints, &query, 1000, 10, 30);

        let engine = SearchEngine::new(&transport, &config, &endpoints, &sleeper);
        let summary = engine.search(&query, &output).unwrap();

        assert_eq!(summary.written, 25);
        assert_eq!(summary.pages, 3);
        assert_eq!(transport.request_count(&query.url(&endpoints, 30)), 0);
        assert_eq!(data_lines(&output).len(), 26);
    }

    #[test]
    fn empty_result_writes_only_header() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let config = Config::default();
        let endpoints = Endpoints::default();
        let transport = ScriptedTransport::new();
        let sleeper = RecordingSleeper::new();
        let query = SearchQuery::new("nobody");
        transport.on(&query.url(&endpoints, 0), ok("https://my.mail.ru/", &page_body(0, 0..0)));

        let engine = SearchEngine::new(&transport, &config, &endpoints, &sleeper);
        let summary = engine.search(&query, &output).unwrap();

        assert_eq!(summary.written, 0);
        assert_eq!(data_lines(&output), vec![CSV_COLUMNS.join(";")]);
    }

    #[test]
    fn flood_control_retries_same_offset_after_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let config = Config::default();
        let endpoints = Endpoints::default();
        let transport = ScriptedTransport::new();
        let sleeper = RecordingSleeper::new();
        let query = SearchQuery::new("ivan");
        transport.on(&query.url(&endpoints, 0), ok("https://my.mail.ru/", &page_body(15, 0..10)));
        let second = query.url(&endpoints, 10);
        transport
            .on(&second, ok("https://my.mail.ru/", "<html>https://help.mail.ru/my/access/unban/</html>"))
            .on(&second, ok("https://my.mail.ru/", &page_body(15, 10..15)));

        let engine = SearchEngine::new(&transport, &config, &endpoints, &sleeper);
        let summary = engine.search(&query, &output).unwrap();

        assert_eq!(summary.written, 15);
        assert_eq!(transport.request_count(&second), 2);
        assert_eq!(transport.request_count(&query.url(&endpoints, 20)), 0);
        assert_eq!(sleeper.waits(), vec![config.delay, config.flood_cooldown]);
    }

    #[test]
    fn transient_failures_retry_with_short_delay() {
        let config = Config::default();
        let endpoints = Endpoints::default();
        let transport = ScriptedTransport::new();
        let sleeper = RecordingSleeper::new();
        let query = SearchQuery::new("ivan");
        let url = query.url(&endpoints, 0);
        transport
            .on(&url, network_error())
            .on(&url, ok("https://my.mail.ru/", "{broken"))
            .on(&url, ok("https://my.mail.ru/", &page_body(1, 0..1)));

        let engine = SearchEngine::new(&transport, &config, &endpoints, &sleeper);
        let page = engine.fetch_page(&query, 0).unwrap();

        assert_eq!(page.records.len(), 1);
        assert_eq!(transport.request_count(&url), 3);
        assert_eq!(sleeper.waits(), vec![config.delay; 2]);
    }

    #[test]
    fn bounded_policy_surfaces_failure() {
        let config = Config::default();
        let endpoints = Endpoints::default();
        let transport = ScriptedTransport::new();
        let sleeper = RecordingSleeper::new();
        let query = SearchQuery::new("ivan");
        transport.on(&query.url(&endpoints, 0), ok("https://my.mail.ru/", "not json"));

        let policies = RetryPolicies {
            transient: RetryPolicy::fixed(Duration::ZERO).bounded(3),
            flood: Some(RetryPolicy::cooldown(Duration::ZERO).bounded(3)),
        };
        let engine = SearchEngine::new(&transport, &config, &endpoints, &sleeper).with_policies(policies);
        let mut pages = engine.pages(&query);

        assert!(matches!(pages.next(), Some(Err(Error::RetriesExhausted { attempts: 4, .. }))));
        assert!(pages.next().is_none());
        assert_eq!(transport.requests().len(), 4);
    }

    #[test]
    fn denied_payload_is_not_retried() {
        let config = Config::default();
        let endpoints = Endpoints::default();
        let transport = ScriptedTransport::new();
        let sleeper = RecordingSleeper::new();
        let query = SearchQuery::new("ivan");
        let body = json!(["AjaxResponse", "OK", endpoints.denied_payload]).to_string();
        transport.on(&query.url(&endpoints, 0), ok("https://my.mail.ru/", &body));

        let engine = SearchEngine::new(&transport, &config, &endpoints, &sleeper);
        assert!(matches!(engine.fetch_page(&query, 0), Err(Error::AccessDenied)));
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(engine.fetch_payload(&query, 0).unwrap(), json!(endpoints.denied_payload));
    }
}
