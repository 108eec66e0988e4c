//! Walking the filtered result listing page by page.

use std::collections::HashSet;

use scraper::{Html, Selector};
use tokio::time::sleep;
use url::Url;

use crate::challenge::{ChallengeHandler, capture, challenge_present};
use crate::config::HarvestConfig;
use crate::error::AppError;
use crate::extract::clean_text;
use crate::models::CandidateReference;
use crate::site;
use crate::traits::{ChallengeSolver, PageClient};

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// What one listing page holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingPage {
    /// The end-of-results marker is shown.
    NoResults,
    /// Company links in page order, resolved against the site origin.
    Links(Vec<CandidateReference>),
}

/// Parses a listing document.
pub fn parse_listing(html: &str, origin: &Url) -> Result<ListingPage, AppError> {
    let doc = Html::parse_document(html);

    let marker = compile(site::NO_RESULTS_MARKER)?;
    if doc
        .select(&marker)
        .any(|el| clean_text(el).contains(site::NO_RESULTS_TEXT))
    {
        return Ok(ListingPage::NoResults);
    }

    let links = compile(site::COMPANY_LINK)?;
    let refs = doc
        .select(&links)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| match origin.join(href) {
            Ok(url) => Some(CandidateReference::new(url.to_string())),
            Err(e) => {
                tracing::debug!(%href, error = %e, "Skipping unresolvable link");
                None
            }
        })
        .collect();
    Ok(ListingPage::Links(refs))
}

fn compile(selector: &str) -> Result<Selector, AppError> {
    Selector::parse(selector).map_err(|e| AppError::SelectorError {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

enum PageRead {
    Listing(ListingPage),
    Blocked,
}

/// Lazy, single-use walk over the listing under the active filter.
///
/// Each [`next`](Self::next) call reads one page and yields the references
/// not seen on earlier pages. The walk ends on the no-results marker, the
/// page cap, an unresolved challenge or a load error on a later page. A
/// load error on the first page read is returned to the caller.
pub struct PageTraversal<'a, P, S> {
    page: &'a P,
    solver: &'a S,
    config: &'a HarvestConfig,
    origin: Url,
    next_page: u32,
    pages_read: u32,
    finished: bool,
    seen: HashSet<CandidateReference>,
}

impl<'a, P, S> PageTraversal<'a, P, S>
where
    P: PageClient,
    S: ChallengeSolver,
{
    pub fn new(page: &'a P, solver: &'a S, config: &'a HarvestConfig) -> Self {
        Self {
            page,
            solver,
            config,
            origin: config.origin(),
            next_page: config.start_page,
            pages_read: 0,
            finished: false,
            seen: HashSet::new(),
        }
    }

    pub fn pages_read(&self) -> u32 {
        self.pages_read
    }

    /// References first seen on the next page, or `None` once the walk is over.
    pub async fn next(&mut self) -> Result<Option<Vec<CandidateReference>>, AppError> {
        if self.finished {
            return Ok(None);
        }
        if self.next_page > self.config.max_page {
            tracing::info!(max_page = self.config.max_page, "Page cap reached");
            self.finished = true;
            return Ok(None);
        }

        let page_no = self.next_page;
        tracing::info!(page = page_no, "Reading listing page");

        match self.read_page(page_no).await {
            Ok(PageRead::Listing(ListingPage::Links(refs))) => {
                self.pages_read += 1;
                self.next_page += 1;
                let fresh: Vec<_> = refs
                    .into_iter()
                    .filter(|r| self.seen.insert(r.clone()))
                    .collect();
                tracing::info!(
                    page = page_no,
                    added = fresh.len(),
                    total = self.seen.len(),
                    "Listing page read"
                );
                Ok(Some(fresh))
            }
            Ok(PageRead::Listing(ListingPage::NoResults)) => {
                tracing::info!(page = page_no, "No more results");
                self.finished = true;
                Ok(None)
            }
            Ok(PageRead::Blocked) => {
                tracing::warn!(page = page_no, "Challenge not cleared, ending traversal");
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                capture(self.page, &format!("page_{page_no}_error")).await;
                if self.pages_read == 0 {
                    return Err(e);
                }
                tracing::warn!(
                    page = page_no,
                    error = %e,
                    "Listing page failed, keeping partial results"
                );
                Ok(None)
            }
        }
    }

    /// Drains the walk into one ordered list.
    pub async fn collect_all(mut self) -> Result<Vec<CandidateReference>, AppError> {
        let mut all = Vec::new();
        while let Some(refs) = self.next().await? {
            all.extend(refs);
        }
        tracing::info!(total = all.len(), pages = self.pages_read, "Traversal finished");
        Ok(all)
    }

    async fn read_page(&self, page_no: u32) -> Result<PageRead, AppError> {
        // Page 1 is the filtered result the search form left open.
        if page_no > 1 || self.pages_read > 0 {
            self.page.navigate(&self.config.listing_url(page_no)).await?;
            sleep(self.config.settle_delay).await;
        }
        self.page.execute(SCROLL_TO_BOTTOM).await?;
        sleep(self.config.settle_delay).await;

        if challenge_present(self.page).await? {
            let mut handler = ChallengeHandler::new(self.page, self.solver, self.config);
            if handler.resolve().await.is_err() {
                return Ok(PageRead::Blocked);
            }
        }

        let html = self.page.page_source().await?;
        Ok(PageRead::Listing(parse_listing(&html, &self.origin)?))
    }
}
