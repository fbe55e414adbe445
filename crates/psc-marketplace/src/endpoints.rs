use psc_schemas::OrderCategory;

/// How a category's id lookup is encoded in the query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdFilter {
    /// One parameter, comma-joined values.
    CommaJoined(&'static str),
    /// The parameter repeated once per id.
    Repeated(&'static str),
}

/// Per-category marketplace API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    /// Query parameter carrying the inclusive creation-date lower bound.
    pub date_filter: &'static str,
    pub id_filter: IdFilter,
}

pub fn endpoint_for(category: OrderCategory) -> Endpoint {
    match category {
        OrderCategory::Product => Endpoint {
            path: "/api/orders",
            date_filter: "start_date",
            id_filter: IdFilter::CommaJoined("order_ids"),
        },
        OrderCategory::Service => Endpoint {
            path: "/api/mms/orders",
            date_filter: "date_created_start",
            id_filter: IdFilter::Repeated("order_id"),
        },
    }
}

impl IdFilter {
    pub fn encode(&self, ids: &[String]) -> Vec<(String, String)> {
        match self {
            IdFilter::CommaJoined(name) => vec![(name.to_string(), ids.join(","))],
            IdFilter::Repeated(name) => ids
                .iter()
                .map(|id| (name.to_string(), id.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_ids_are_comma_joined() {
        let ids = vec!["A".to_string(), "B".to_string()];
        assert_eq!(
            endpoint_for(OrderCategory::Product).id_filter.encode(&ids),
            vec![("order_ids".to_string(), "A,B".to_string())]
        );
    }

    #[test]
    fn service_ids_are_repeated() {
        let ids = vec!["A".to_string(), "B".to_string()];
        assert_eq!(
            endpoint_for(OrderCategory::Service).id_filter.encode(&ids),
            vec![
                ("order_id".to_string(), "A".to_string()),
                ("order_id".to_string(), "B".to_string())
            ]
        );
    }
}
