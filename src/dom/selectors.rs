//! Class names and compiled selectors for the supported thread layouts.

use once_cell::sync::Lazy;
use scraper::Selector;

/// Thread container.
pub const THREAD: &str = "thre";
/// Timestamp-bearing node (`YY/MM/DD(W)HH:MM:SS`, optionally ` ID:...`).
pub const TIMESTAMP: &str = "cnw";
/// Post-number-bearing node (`No.<digits>`).
pub const POST_NUMBER: &str = "cno";
/// Explicit response-number annotation written by the merger.
pub const RES_NUMBER: &str = "res_no";
/// The page's own running reply counter.
pub const NATIVE_COUNTER: &str = "rsc";
/// Reply body cell.
pub const REPLY_CELL: &str = "rtd";
/// Marker class on deleted replies in tsumanne archives.
pub const DELETED: &str = "deleted";

fn compile(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

pub static THREAD_DIRECT: Lazy<Selector> = Lazy::new(|| compile("body .thre"));
pub static THREAD_CLASS: Lazy<Selector> = Lazy::new(|| compile(".thre"));
pub static DATA_RES: Lazy<Selector> = Lazy::new(|| compile("[data-res]"));
pub static TIMESTAMP_NODE: Lazy<Selector> = Lazy::new(|| compile(".cnw"));
pub static FUTACLO_WRAPPER: Lazy<Selector> = Lazy::new(|| compile(".thre > div > table"));
pub static SCRIPT_WITH_SRC: Lazy<Selector> = Lazy::new(|| compile("script[src]"));
pub static TITLE: Lazy<Selector> = Lazy::new(|| compile("title"));
pub static TABLE: Lazy<Selector> = Lazy::new(|| compile("table"));
