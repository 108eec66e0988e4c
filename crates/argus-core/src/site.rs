//! Markup of the registry site: selectors, labels and marker texts.

/// Text anchor holding the company tax ID; its presence means the detail
/// page rendered.
pub const TAX_ID_ANCHOR: &str = "#copy-inn";

/// Embedded challenge widget shown instead of content.
pub const CHALLENGE_FRAME: &str = "iframe[title*='reCAPTCHA']";
pub const CHALLENGE_SITE_KEY: &str = "div[data-sitekey]";
pub const CHALLENGE_RESPONSE_FIELD: &str = "g-recaptcha-response";
pub const CHALLENGE_SUBMIT: &str = "button[type='submit']";
/// Offset of the checkbox inside the challenge frame, in CSS pixels.
pub const CHALLENGE_CHECKBOX_OFFSET: (f64, f64) = (27.0, 39.0);

pub const NO_RESULTS_MARKER: &str = "p.mt-4.text-center";
pub const NO_RESULTS_TEXT: &str = "Не найдено ни одного юридического лица";
pub const COMPANY_LINK: &str = "a.link[href^=\"/company/\"]";

pub const FILTER_DATE_TOGGLE: &str = "button[data-bs-target='#flush-collapse-1']";
pub const FILTER_DATE_FROM: &str = "#reg_date_from";
pub const FILTER_DATE_TO: &str = "#reg_date_to";
pub const FILTER_APPLY_TEXT: &str = "Применить";

pub const LABEL_NODES: &str = "strong.fw-700, div.fw-700";
pub const PLAIN_LABEL_NODES: &str = "div";
pub const PERSON_BLOCK: &str = "div.mb-3";
pub const PERSON_LINK: &str = "a.link";
pub const FOUNDER_ROWS: &str = "#founders table tbody tr";
pub const CONTACT_BLOCKS: &str = "div.col-12.col-lg-4";
pub const PHONE_LINKS: &str = "a[href^=\"tel:\"]";
pub const EMAIL_LINKS: &str = "a[href^=\"mailto:\"]";

pub const LABEL_REGISTRATION_DATE: &str = "Дата регистрации";
pub const LABEL_DIRECTOR: &str = "Директор";
pub const LABEL_GENERAL_DIRECTOR: &str = "Генеральный директор";
pub const LABEL_FOUNDER: &str = "Учредитель";
pub const LABEL_PHONE: &str = "Телефон";
pub const LABEL_ACTIVITY: &str = "Основной вид деятельности";
pub const LABEL_ADDRESS: &str = "Юридический адрес";
pub const LABEL_CAPITAL: &str = "Уставный капитал";
pub const TAX_ID_PREFIX: &str = "ИНН";
