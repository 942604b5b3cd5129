use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::categories::{Category, DEFAULT_ICON};
use crate::supplies::{Supply, SupplyStatus};
use crate::{AppError, AppResult};

pub const NOTHING_NEEDED_CODE: &str = "EXPORT/NOTHING_NEEDED";

const STYLE: &str = "\
body { font-family: Arial, sans-serif; padding: 40px; max-width: 800px; margin: 0 auto; }
h1 { color: #059669; border-bottom: 3px solid #059669; padding-bottom: 10px; }
h2 { color: #0891b2; margin-top: 30px; }
.item { padding: 10px; margin: 5px 0; background: #f0fdf4; border-left: 4px solid #10b981; }
.status { display: inline-block; padding: 2px 8px; border-radius: 4px; font-size: 12px; font-weight: bold; }
.status-low { background: #fef3c7; color: #92400e; }
.status-out { background: #fee2e2; color: #991b1b; }
.date { text-align: right; color: #6b7280; font-size: 14px; margin-top: 20px; }";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingItem {
    pub name: String,
    pub status: SupplyStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingSection {
    pub category_id: String,
    pub name: String,
    pub icon: String,
    pub items: Vec<ShoppingItem>,
}

/// Low and out items grouped by category, in the order categories first
/// appear among the supplies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingList {
    pub sections: Vec<ShoppingSection>,
    pub generated_at: DateTime<Utc>,
}

pub fn badge(status: SupplyStatus) -> &'static str {
    match status {
        SupplyStatus::Out => "Out of Stock",
        _ => "Low Stock",
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

impl ShoppingList {
    /// `EXPORT/NOTHING_NEEDED` when no supply is low or out.
    pub fn from_collections(categories: &[Category], supplies: &[Supply]) -> AppResult<Self> {
        Self::build(categories, supplies, Utc::now())
    }

    pub fn build(
        categories: &[Category],
        supplies: &[Supply],
        generated_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let mut sections: Vec<ShoppingSection> = Vec::new();
        for supply in supplies.iter().filter(|s| s.status.needs_restock()) {
            let item = ShoppingItem {
                name: supply.name.clone(),
                status: supply.status,
            };
            match sections.iter_mut().find(|s| s.category_id == supply.category) {
                Some(section) => section.items.push(item),
                None => {
                    let category = categories.iter().find(|c| c.id == supply.category);
                    sections.push(ShoppingSection {
                        category_id: supply.category.clone(),
                        name: category.map_or_else(|| "Unknown".to_string(), |c| c.name.clone()),
                        icon: category
                            .map(|c| c.icon.clone())
                            .filter(|icon| !icon.is_empty())
                            .unwrap_or_else(|| DEFAULT_ICON.to_string()),
                        items: vec![item],
                    });
                }
            }
        }
        if sections.is_empty() {
            return Err(AppError::new(NOTHING_NEEDED_CODE, "No items need to be bought!"));
        }
        Ok(Self {
            sections,
            generated_at,
        })
    }

    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    pub fn file_name(&self) -> String {
        format!("shopping-list-{}.html", self.generated_at.format("%Y-%m-%d"))
    }

    pub fn to_html(&self) -> String {
        let mut body = String::new();
        for section in &self.sections {
            body.push_str(&format!(
                "<h2>{} {}</h2>\n",
                escape_html(&section.icon),
                escape_html(&section.name)
            ));
            for item in &section.items {
                body.push_str(&format!(
                    "<div class=\"item\"><strong>{}</strong> <span class=\"status status-{}\">{}</span></div>\n",
                    escape_html(&item.name),
                    item.status.as_str(),
                    badge(item.status)
                ));
            }
        }
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Shopping List</title>\n\
             <style>\n{STYLE}\n</style>\n</head>\n<body>\n<h1>🛒 Shopping List</h1>\n{body}\
             <div class=\"date\">Generated on {}</div>\n</body>\n</html>\n",
            self.generated_at.format("%Y-%m-%d at %H:%M:%S UTC")
        )
    }

    pub fn to_text(&self) -> String {
        let mut out = String::from("🛒 Shopping List\n");
        for section in &self.sections {
            out.push_str(&format!("\n{} {}\n", section.icon, section.name));
            for item in &section.items {
                out.push_str(&format!("  - {} ({})\n", item.name, badge(item.status)));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn category(id: &str, name: &str, icon: &str) -> Category {
        Category {
            id: id.into(),
            household_id: "h1".into(),
            name: name.into(),
            name_ar: None,
            name_en: None,
            icon: icon.into(),
            is_custom: false,
            created_at: 0,
        }
    }

    fn supply(name: &str, category: &str, status: SupplyStatus) -> Supply {
        Supply {
            id: format!("{category}-{name}"),
            household_id: "h1".into(),
            name: name.into(),
            name_ar: None,
            name_en: None,
            status,
            category: category.into(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, 14, 5, 0).unwrap()
    }

    #[test]
    fn groups_needed_items_by_category() {
        let categories = [category("spices", "Spices", "🌶️")];
        let supplies = [
            supply("Cumin", "spices", SupplyStatus::Low),
            supply("Soap", "gone", SupplyStatus::Out),
            supply("Salt", "spices", SupplyStatus::Out),
            supply("Tea", "spices", SupplyStatus::Available),
        ];
        let list = ShoppingList::build(&categories, &supplies, fixed_time()).unwrap();
        assert_eq!(list.item_count(), 3);
        assert_eq!(list.sections[0].name, "Spices");
        assert_eq!(list.sections[0].items.len(), 2);
        assert_eq!(list.sections[1].name, "Unknown");
        assert_eq!(list.sections[1].icon, DEFAULT_ICON);
        assert_eq!(list.file_name(), "shopping-list-2026-03-09.html");
    }

    #[test]
    fn html_has_badges_and_escapes_names() {
        let supplies = [
            supply("Salt & <Pepper>", "x", SupplyStatus::Low),
            supply("Rice", "x", SupplyStatus::Out),
        ];
        let html = ShoppingList::build(&[], &supplies, fixed_time()).unwrap().to_html();
        assert!(html.contains("<title>Shopping List</title>"));
        assert!(html.contains("Salt &amp; &lt;Pepper&gt;"));
        assert!(html.contains("status-low\">Low Stock"));
        assert!(html.contains("status-out\">Out of Stock"));
        assert!(html.contains("Generated on 2026-03-09 at 14:05:00 UTC"));
    }

    #[test]
    fn text_lists_items() {
        let supplies = [supply("Rice", "x", SupplyStatus::Out)];
        let text = ShoppingList::build(&[], &supplies, fixed_time()).unwrap().to_text();
        assert!(text.contains("📦 Unknown"));
        assert!(text.contains("  - Rice (Out of Stock)"));
    }

    #[test]
    fn nothing_needed_is_an_error() {
        let supplies = [supply("Tea", "x", SupplyStatus::Available)];
        let err = ShoppingList::from_collections(&[], &supplies).unwrap_err();
        assert_eq!(err.code(), NOTHING_NEEDED_CODE);
        assert!(err.is_validation());
    }
}
