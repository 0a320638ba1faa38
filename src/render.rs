//! Message text for the chat side. Telegram's legacy Markdown has no escape
//! for closing markers, so poem text is stripped of the few characters that
//! would open an entity.

use crate::content::ContentItem;
use crate::schedule::Category;
use crate::transport::AudioMeta;

/// Drop characters that start legacy Markdown entities (`*`, `_`, `` ` ``, `[`).
pub fn escape_markdown(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '['))
        .collect()
}

/// The header names the day's poet as configured; the API's own author
/// name is kept for the audio metadata and the activity log.
pub fn poem_message(item: &ContentItem, category: &Category) -> String {
    let mut msg = format!(
        "🌞 *شعر امروز ({})*\n\n📜 *{}*\n\n\"{}\"",
        escape_markdown(&category.display_name),
        escape_markdown(&item.title),
        escape_markdown(&item.body_text),
    );
    if let Some(summary) = &item.summary_text {
        msg.push_str("\n\n💡 *تفسیر:*\n");
        msg.push_str(&escape_markdown(summary));
    }
    msg
}

/// Administrator text goes out as written, Markdown included.
pub fn broadcast_message(text: &str) -> String {
    format!("📢 *پیام اطلاعیه:*\n\n{text}")
}

pub fn audio_meta(item: &ContentItem) -> AudioMeta {
    AudioMeta {
        caption: format!("🎙 دکلمه: {}", item.title),
        performer: item.author_name.clone(),
        title: item.title.clone(),
    }
}

pub const NO_NEW_POEM: &str = "خطا در دریافت شعر. شعر تازه‌ای پیدا نشد، لطفاً بعداً دوباره امتحان کنید.";
pub const ACCESS_DENIED: &str = "⛔ شما اجازه دسترسی به این دستور را ندارید.";
pub const NO_SUBSCRIBERS: &str = "لیست مشترکین خالی است.";
pub const HISTORY_CAPTION: &str = "📦 History File (JSON)";
pub const ACTIVITY_CAPTION: &str = "📝 Activity Log (TXT)";
pub const HISTORY_MISSING: &str = "❌ History file not found.";
pub const ACTIVITY_MISSING: &str = "❌ Log file not found (Empty?).";

pub fn broadcast_summary(sent: usize, failed: usize) -> String {
    format!("✅ پیام شما ارسال شد. موفق: {sent} | ناموفق: {failed}")
}
