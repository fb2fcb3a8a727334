pub mod terminal;

use marginalia::session::ViewModel;

/// JSON shape of a view for `--format json`
pub fn view_json(view: &ViewModel) -> serde_json::Value {
    let options: Vec<serde_json::Value> = view
        .keyboard_options
        .iter()
        .map(|option| {
            serde_json::json!({
                "label": option.label,
                "payload": option.payload(),
            })
        })
        .collect();

    serde_json::json!({
        "displayText": view.display_text,
        "keyboardOptions": options,
        "isComplete": view.is_complete,
    })
}
