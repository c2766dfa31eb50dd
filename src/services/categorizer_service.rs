/// Category used when no keyword matches.
pub const DEFAULT_CATEGORY: &str = "Other";

/// Spending categories and the keywords that select them, in priority order.
/// The first category with any keyword contained in the text wins.
pub const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Food & Dining",
        &[
            "restaurant", "cafe", "food", "dining", "grocery", "supermarket", "mcdonald",
            "starbucks", "uber eats", "doordash",
        ],
    ),
    (
        "Transport",
        &[
            "uber", "lyft", "taxi", "gas", "fuel", "parking", "metro", "subway", "bus", "train",
            "flight", "airline",
        ],
    ),
    (
        "Shopping",
        &["amazon", "target", "walmart", "retail", "store", "shop", "purchase", "mall"],
    ),
    (
        "Subscriptions",
        &["netflix", "spotify", "subscription", "membership", "recurring", "monthly"],
    ),
    (
        "Utilities",
        &[
            "electric", "water", "gas", "utility", "bill", "internet", "phone", "cell", "cable",
        ],
    ),
    (
        "Housing",
        &["rent", "mortgage", "housing", "apartment", "home", "property"],
    ),
    (
        "Entertainment",
        &["movie", "cinema", "theater", "concert", "event", "ticket"],
    ),
    (
        "Health",
        &["pharmacy", "hospital", "doctor", "medical", "health", "drug", "clinic"],
    ),
    (
        "Education",
        &["school", "tuition", "education", "course", "university", "college"],
    ),
    (
        "Bills & Fees",
        &["fee", "charge", "payment", "service", "admin"],
    ),
];

/// Assign a spending category from a transaction's description and merchant.
pub fn categorize(description: &str, merchant: &str) -> &'static str {
    let text = format!("{} {}", description, merchant).to_lowercase();

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}
