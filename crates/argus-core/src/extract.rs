//! Field extraction from a rendered company detail page.
//!
//! Every field is resolved through an ordered chain of named lookups held
//! in an [`ExtractionPlan`]. The first lookup yielding a non-empty value
//! wins. A lookup that fails structurally (for instance an invalid
//! selector) is logged and skipped, so one broken section never costs the
//! rest of the record.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::AppError;
use crate::models::{CompanyRecord, phone_key};
use crate::site;

static PERSON_TAX_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ИНН\s*:?\s*(\d{10,12})").expect("person tax ID pattern compiles")
});
static BARE_TAX_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10,12}$").expect("bare tax ID pattern compiles"));
static ACTIVITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}(?:\.\d{1,2}){0,2})\s*(.*)$").expect("activity pattern compiles")
});

/// A strategy for locating one text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Text of the first element matching the selector.
    Selector(&'static str),
    /// Text of the element right after the node labelled `label`.
    NextToLabel {
        nodes: &'static str,
        label: &'static str,
    },
    /// Text of the labelled node's parent, with the label removed.
    ContainerMinusLabel {
        nodes: &'static str,
        label: &'static str,
    },
}

impl Lookup {
    pub fn name(&self) -> &'static str {
        match self {
            Lookup::Selector(_) => "selector",
            Lookup::NextToLabel { .. } => "next_to_label",
            Lookup::ContainerMinusLabel { .. } => "container_minus_label",
        }
    }

    fn run(&self, doc: &Html) -> Result<Option<String>, AppError> {
        match *self {
            Lookup::Selector(selector) => {
                let sel = compile(selector)?;
                Ok(doc.select(&sel).next().map(clean_text).filter(|t| !t.is_empty()))
            }
            Lookup::NextToLabel { nodes, label } => {
                let Some(node) = find_label(doc, nodes, label)? else {
                    return Ok(None);
                };
                Ok(node
                    .next_siblings()
                    .find_map(ElementRef::wrap)
                    .map(clean_text)
                    .filter(|t| !t.is_empty()))
            }
            Lookup::ContainerMinusLabel { nodes, label } => {
                let Some(node) = find_label(doc, nodes, label)? else {
                    return Ok(None);
                };
                Ok(node
                    .parent()
                    .and_then(ElementRef::wrap)
                    .map(|parent| strip_label(&clean_text(parent), label))
                    .filter(|t| !t.is_empty()))
            }
        }
    }
}

/// Name and tax ID of a company officer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    pub name: Option<String>,
    pub tax_id: Option<String>,
}

impl Person {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.tax_id.is_none()
    }
}

/// A strategy for locating an officer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonLookup {
    /// First data row of a table of persons.
    TableRow { rows: &'static str },
    /// First link after the role label within the label's block.
    LabelledLink {
        nodes: &'static str,
        label: &'static str,
    },
    /// The label's block text, with the label and tax ID suffix removed.
    LabelledBlock {
        nodes: &'static str,
        label: &'static str,
    },
}

impl PersonLookup {
    pub fn name(&self) -> &'static str {
        match self {
            PersonLookup::TableRow { .. } => "table_row",
            PersonLookup::LabelledLink { .. } => "labelled_link",
            PersonLookup::LabelledBlock { .. } => "labelled_block",
        }
    }

    fn run(&self, doc: &Html) -> Result<Option<Person>, AppError> {
        let person = match *self {
            PersonLookup::TableRow { rows } => {
                let row_sel = compile(rows)?;
                let cell_sel = compile("td")?;
                let link_sel = compile("a")?;
                let Some(row) = doc
                    .select(&row_sel)
                    .find(|row| row.select(&cell_sel).next().is_some())
                else {
                    return Ok(None);
                };
                let cells: Vec<String> = row.select(&cell_sel).map(clean_text).collect();
                let name = row
                    .select(&link_sel)
                    .map(clean_text)
                    .find(|t| !t.is_empty())
                    .or_else(|| {
                        cells
                            .iter()
                            .find(|c| !c.is_empty() && !BARE_TAX_ID.is_match(c))
                            .cloned()
                    });
                let tax_id = cells
                    .iter()
                    .find(|c| BARE_TAX_ID.is_match(c))
                    .cloned()
                    .or_else(|| person_tax_id(&cells.join(" ")));
                Person { name, tax_id }
            }
            PersonLookup::LabelledLink { nodes, label } => {
                let Some(node) = find_label(doc, nodes, label)? else {
                    return Ok(None);
                };
                let block = person_block(node)?;
                let link_sel = compile(site::PERSON_LINK)?;
                let mut after_label = false;
                let name = block.descendants().find_map(|n| {
                    if n.id() == node.id() {
                        after_label = true;
                        return None;
                    }
                    let el = ElementRef::wrap(n)?;
                    (after_label && link_sel.matches(&el))
                        .then(|| clean_text(el))
                        .filter(|t| !t.is_empty())
                });
                if name.is_none() {
                    return Ok(None);
                }
                Person {
                    name,
                    tax_id: person_tax_id(&clean_text(block)),
                }
            }
            PersonLookup::LabelledBlock { nodes, label } => {
                let Some(node) = find_label(doc, nodes, label)? else {
                    return Ok(None);
                };
                let text = clean_text(person_block(node)?);
                let rest = strip_label(&text, label);
                let name = rest
                    .split(site::TAX_ID_PREFIX)
                    .next()
                    .map(|s| s.trim().trim_end_matches([',', ';', ':']).trim().to_string())
                    .filter(|s| !s.is_empty());
                Person {
                    name,
                    tax_id: person_tax_id(&text),
                }
            }
        };
        Ok((!person.is_empty()).then_some(person))
    }
}

/// Ordered lookup chains for every field of a [`CompanyRecord`].
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    /// Element whose text is the company tax ID; required.
    pub tax_id_anchor: &'static str,
    pub registration_date: Vec<Lookup>,
    pub director: Vec<PersonLookup>,
    pub founder: Vec<PersonLookup>,
    pub activity: Vec<Lookup>,
    pub legal_address: Vec<Lookup>,
    pub charter_capital: Vec<Lookup>,
    pub contact_blocks: &'static str,
    pub phone_label: &'static str,
    pub phone_links: &'static str,
    pub email_links: &'static str,
}

impl Default for ExtractionPlan {
    fn default() -> Self {
        use site::*;

        let labelled = |label| {
            vec![
                Lookup::NextToLabel {
                    nodes: LABEL_NODES,
                    label,
                },
                Lookup::NextToLabel {
                    nodes: PLAIN_LABEL_NODES,
                    label,
                },
                Lookup::ContainerMinusLabel {
                    nodes: LABEL_NODES,
                    label,
                },
                Lookup::ContainerMinusLabel {
                    nodes: PLAIN_LABEL_NODES,
                    label,
                },
            ]
        };

        Self {
            tax_id_anchor: TAX_ID_ANCHOR,
            registration_date: labelled(LABEL_REGISTRATION_DATE),
            director: vec![
                PersonLookup::LabelledLink {
                    nodes: LABEL_NODES,
                    label: LABEL_GENERAL_DIRECTOR,
                },
                PersonLookup::LabelledLink {
                    nodes: LABEL_NODES,
                    label: LABEL_DIRECTOR,
                },
                PersonLookup::LabelledBlock {
                    nodes: LABEL_NODES,
                    label: LABEL_GENERAL_DIRECTOR,
                },
                PersonLookup::LabelledBlock {
                    nodes: LABEL_NODES,
                    label: LABEL_DIRECTOR,
                },
            ],
            founder: vec![
                PersonLookup::TableRow { rows: FOUNDER_ROWS },
                PersonLookup::LabelledLink {
                    nodes: LABEL_NODES,
                    label: LABEL_FOUNDER,
                },
                PersonLookup::LabelledBlock {
                    nodes: LABEL_NODES,
                    label: LABEL_FOUNDER,
                },
            ],
            activity: labelled(LABEL_ACTIVITY),
            legal_address: labelled(LABEL_ADDRESS),
            charter_capital: labelled(LABEL_CAPITAL),
            contact_blocks: CONTACT_BLOCKS,
            phone_label: LABEL_PHONE,
            phone_links: PHONE_LINKS,
            email_links: EMAIL_LINKS,
        }
    }
}

/// Turns detail-page HTML into a [`CompanyRecord`].
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    plan: ExtractionPlan,
}

impl FieldExtractor {
    pub fn new(plan: ExtractionPlan) -> Self {
        Self { plan }
    }

    /// Extracts one record, or `None` when the tax ID anchor is missing.
    ///
    /// Validity (contact presence) is not checked here.
    pub fn extract(&self, html: &str, source_url: &str) -> Option<CompanyRecord> {
        let doc = Html::parse_document(html);
        let plan = &self.plan;

        let tax_id = match Lookup::Selector(plan.tax_id_anchor).run(&doc) {
            Ok(Some(tax_id)) => tax_id,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Tax ID anchor lookup failed");
                return None;
            }
        };

        let mut record = CompanyRecord::new(tax_id, source_url);
        record.registration_date = resolve_text(&doc, "registration_date", &plan.registration_date);

        if let Some(director) = resolve_person(&doc, "director", &plan.director) {
            record.director_name = director.name;
            record.director_tax_id = director.tax_id;
        }
        if let Some(founder) = resolve_person(&doc, "founder", &plan.founder) {
            record.founder_name = founder.name;
            record.founder_tax_id = founder.tax_id;
        }

        if let Some(activity) = resolve_text(&doc, "activity", &plan.activity) {
            let (code, description) = split_activity(&activity);
            record.activity_code = code;
            record.activity_description = description;
        }
        record.legal_address = resolve_text(&doc, "legal_address", &plan.legal_address);
        record.charter_capital = resolve_text(&doc, "charter_capital", &plan.charter_capital);

        match self.phones(&doc) {
            Ok(phones) => {
                for phone in phones {
                    record.push_phone(&phone);
                }
            }
            Err(e) => tracing::debug!(field = "phones", error = %e, "Lookup failed"),
        }
        match self.email(&doc) {
            Ok(email) => record.email = email,
            Err(e) => tracing::debug!(field = "email", error = %e, "Lookup failed"),
        }

        Some(record)
    }

    fn phones(&self, doc: &Html) -> Result<Vec<String>, AppError> {
        let block_sel = compile(self.plan.contact_blocks)?;
        let link_sel = compile(self.plan.phone_links)?;
        let mut phones = Vec::new();
        for block in doc.select(&block_sel) {
            if !clean_text(block).contains(self.plan.phone_label) {
                continue;
            }
            for link in block.select(&link_sel) {
                let text = clean_text(link);
                // Labels like "Позвонить" carry no digits; the number is in the href.
                let phone = if phone_key(&text).is_empty() {
                    link.value()
                        .attr("href")
                        .and_then(|h| h.strip_prefix("tel:"))
                        .unwrap_or_default()
                        .trim()
                        .to_string()
                } else {
                    text
                };
                if !phone.is_empty() {
                    phones.push(phone);
                }
            }
        }
        Ok(phones)
    }

    fn email(&self, doc: &Html) -> Result<Option<String>, AppError> {
        let sel = compile(self.plan.email_links)?;
        Ok(doc.select(&sel).next().and_then(|link| {
            let text = clean_text(link);
            if text.contains('@') {
                return Some(text);
            }
            link.value()
                .attr("href")
                .and_then(|h| h.strip_prefix("mailto:"))
                .map(|h| h.split('?').next().unwrap_or(h).trim().to_string())
                .filter(|e| !e.is_empty())
        }))
    }
}

/// Extracts a record with the default plan.
pub fn extract_company(html: &str, source_url: &str) -> Option<CompanyRecord> {
    FieldExtractor::default().extract(html, source_url)
}

fn resolve_text(doc: &Html, field: &str, chain: &[Lookup]) -> Option<String> {
    for lookup in chain {
        match lookup.run(doc) {
            Ok(Some(value)) => {
                tracing::trace!(field, strategy = lookup.name(), "Field resolved");
                return Some(value);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(field, strategy = lookup.name(), error = %e, "Lookup failed");
            }
        }
    }
    None
}

fn resolve_person(doc: &Html, field: &str, chain: &[PersonLookup]) -> Option<Person> {
    for lookup in chain {
        match lookup.run(doc) {
            Ok(Some(person)) => {
                tracing::trace!(field, strategy = lookup.name(), "Person resolved");
                return Some(person);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(field, strategy = lookup.name(), error = %e, "Lookup failed");
            }
        }
    }
    None
}

fn compile(selector: &str) -> Result<Selector, AppError> {
    Selector::parse(selector).map_err(|e| AppError::SelectorError {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Element text with whitespace collapsed to single spaces.
pub(crate) fn clean_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Innermost element matching `nodes` whose text is exactly `label`.
fn find_label<'a>(
    doc: &'a Html,
    nodes: &str,
    label: &str,
) -> Result<Option<ElementRef<'a>>, AppError> {
    let sel = compile(nodes)?;
    Ok(doc.select(&sel).find(|el| {
        clean_text(*el) == label
            && el
                .children()
                .filter_map(ElementRef::wrap)
                .all(|child| clean_text(child) != label)
    }))
}

fn person_block(label: ElementRef<'_>) -> Result<ElementRef<'_>, AppError> {
    let block_sel = compile(site::PERSON_BLOCK)?;
    Ok(label
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| block_sel.matches(a))
        .or_else(|| label.parent().and_then(ElementRef::wrap))
        .unwrap_or(label))
}

fn strip_label(text: &str, label: &str) -> String {
    text.replacen(label, "", 1).trim().to_string()
}

fn person_tax_id(text: &str) -> Option<String> {
    PERSON_TAX_ID
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn split_activity(text: &str) -> (Option<String>, Option<String>) {
    match ACTIVITY.captures(text) {
        Some(caps) => {
            let code = caps.get(1).map(|m| m.as_str().to_string());
            let description = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|d| !d.is_empty());
            (code, description)
        }
        None => (None, Some(text.to_string())),
    }
}
