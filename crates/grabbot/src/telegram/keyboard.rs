//! Inline keyboards shown under the probe result.

use grabcore::download::probe::{QualityOption, CLOSE_CALLBACK};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// One button per quality option, then a Close row.
pub fn quality_keyboard(options: &[QualityOption]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = options
        .iter()
        .map(|opt| vec![InlineKeyboardButton::callback(opt.label.clone(), opt.callback_data.clone())])
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("❌ Close", CLOSE_CALLBACK)]);
    InlineKeyboardMarkup::new(rows)
}
