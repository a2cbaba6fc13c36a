use serde::Deserialize;
use utoipa::IntoParams;

/// Fixed listing page size.
pub const PAGE_SIZE: u32 = 12;

/// Recognized sort orders. Anything else degrades to `Newest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    PriceLow,
    PriceHigh,
    Bedrooms,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "newest" => SortOrder::Newest,
            "oldest" => SortOrder::Oldest,
            "price-low" => SortOrder::PriceLow,
            "price-high" => SortOrder::PriceHigh,
            "bedrooms" => SortOrder::Bedrooms,
            _ => SortOrder::Newest,
        }
    }
}

/// Raw query-string parameters exactly as the presentation layer sends them.
/// Everything is an optional string; normalization happens in [`RawFilters::normalize`].
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(default)]
pub struct RawFilters {
    pub query: Option<String>,
    pub location: Option<String>,
    #[serde(rename = "type")]
    pub property_type: Option<String>,
    #[serde(rename = "minPrice")]
    pub min_price: Option<String>,
    #[serde(rename = "maxPrice")]
    pub max_price: Option<String>,
    pub bedrooms: Option<String>,
    pub page: Option<String>,
    pub sort: Option<String>,
}

/// Typed, validated filter set consumed by the query layer.
#[derive(Debug, Clone, Default)]
pub struct ListingFilters {
    pub query: Option<String>,
    pub location: Option<String>,
    /// Matched against the *title* field: there is no property-type column,
    /// so this is a deliberate lossy proxy carried over from the site search.
    pub property_type: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub bedrooms: Option<i32>,
    /// Set only by internal call paths (featured listing, admin dashboard);
    /// never populated from the public query string.
    pub featured: Option<bool>,
    pub page: u32,
    pub sort: SortOrder,
    /// Overrides the fixed page size when set (featured/related paths).
    pub limit: Option<i64>,
}

impl ListingFilters {
    pub fn page_size(&self) -> i64 {
        self.limit.unwrap_or(PAGE_SIZE as i64)
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size()
    }
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_opt<T: std::str::FromStr>(raw: &Option<String>) -> Option<T> {
    raw.as_deref().and_then(|s| s.trim().parse().ok())
}

impl RawFilters {
    /// Turn raw string parameters into a typed filter set. Pure and total:
    /// malformed input degrades to "no filter applied", it never errors.
    /// A public search box must not hard-fail on bad input.
    pub fn normalize(self) -> ListingFilters {
        let page = parse_opt::<i64>(&self.page)
            .filter(|p| *p >= 1)
            .map(|p| p as u32)
            .unwrap_or(1);
        let sort = self
            .sort
            .as_deref()
            .map(SortOrder::parse)
            .unwrap_or_default();
        ListingFilters {
            min_price: parse_opt(&self.min_price).filter(|p: &f64| p.is_finite()),
            max_price: parse_opt(&self.max_price).filter(|p: &f64| p.is_finite()),
            bedrooms: parse_opt(&self.bedrooms),
            query: non_blank(self.query),
            location: non_blank(self.location),
            property_type: non_blank(self.property_type),
            featured: None,
            page,
            sort,
            limit: None,
        }
    }
}
