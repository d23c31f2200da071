use crate::config::{Config, Endpoints};
use crate::delay_manager::Sleeper;
use crate::error::Result;
use crate::extractor::{Extractor, ListingEntry, LISTING_COLUMNS};
use crate::http_client::Transport;
use crate::result_sink::{LineEnding, ResultSink};
use crate::retry::{run_with_retry, RetryPolicies};
use log::info;
use std::path::Path;

/// Crawl of the mobile people listing. This surface reports no total, so the
/// run ends on the first page that is not full.
pub struct SimpleSearch<'a, T: Transport> {
    transport: &'a T,
    config: &'a Config,
    endpoints: &'a Endpoints,
    sleeper: &'a dyn Sleeper,
    policies: RetryPolicies,
    extractor: Extractor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageVerdict {
    Stop,
    WriteAndStop,
    WriteAndContinue,
}

impl<'a, T: Transport> SimpleSearch<'a, T> {
    pub fn new(
        transport: &'a T,
        config: &'a Config,
        endpoints: &'a Endpoints,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        SimpleSearch {
            transport,
            config,
            endpoints,
            sleeper,
            policies: RetryPolicies::from_config(config).without_flood(),
            extractor: Extractor::new(),
        }
    }

    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    pub fn page_url(&self, name: &str, page: u32) -> String {
        format!(
            "{}?st=search&common={}&p={}",
            self.endpoints.listing_url,
            urlencoding::encode(name),
            page
        )
    }

    fn verdict(&self, links: usize) -> PageVerdict {
        if links == 0 {
            PageVerdict::Stop
        } else if links < self.config.listing_page_size {
            PageVerdict::WriteAndStop
        } else {
            PageVerdict::WriteAndContinue
        }
    }

    /// Returns the number of rows written.
    pub fn run(&self, name: &str, output: &Path) -> Result<u64> {
        let mut sink = ResultSink::create(output, &LISTING_COLUMNS, LineEnding::Lf)?;

        for page in 1..=self.config.listing_max_pages {
            info!("processing page {}...", page);
            let url = self.page_url(name, page);
            let operation = format!("listing page {}", page);
            let html = run_with_retry(&self.policies, self.sleeper, &operation, || {
                Ok(self.transport.get(&url)?.body)
            })?;

            let (links, entries) = self.extractor.parse_listing(&html);
            let verdict = self.verdict(links);
            if verdict == PageVerdict::Stop {
                break;
            }

            self.write(&mut sink, &entries)?;
            if verdict == PageVerdict::WriteAndStop {
                break;
            }
            self.sleeper.sleep(self.config.delay);
        }

        info!("done");
        Ok(sink.rows_written())
    }

    fn write(&self, sink: &mut ResultSink, entries: &[ListingEntry]) -> Result<()> {
        for entry in entries {
            info!("{} {} {}", entry.email, entry.bio_info, entry.geo_info);
        }
        sink.append(entries.iter().map(ListingEntry::to_row))?;
        Ok(())
    }
}
