//! HTML parsing of the portal's city list and route selector.

use indexmap::IndexSet;
use scraper::{Html, Selector};

use crate::{
    models::route::RouteId,
    providers::{ParseSnafu, ProviderError},
};

const CITY_LIST_SELECTOR: &str = r#"div[aria-label*="Список городов"]"#;
const CITY_LINK_SELECTOR: &str = "a.item";
const ROUTE_OPTION_SELECTOR: &str = r#"select[name="bus_id"] option"#;
/// Value of the "choose a route" placeholder option.
const ROUTE_SENTINEL: &str = "0";

fn selector(css: &str) -> Result<Selector, ProviderError> {
    Selector::parse(css).map_err(|e| {
        ParseSnafu {
            message: format!("invalid CSS selector '{css}': {e}"),
        }
        .build()
    })
}

/// Extracts city slugs from the front page, in page order, without duplicates.
pub fn parse_city_slugs(body: &str) -> Result<Vec<String>, ProviderError> {
    let doc = Html::parse_document(body);
    let list_sel = selector(CITY_LIST_SELECTOR)?;
    let link_sel = selector(CITY_LINK_SELECTOR)?;

    let Some(list) = doc.select(&list_sel).next() else {
        return ParseSnafu {
            message: "city list container not found",
        }
        .fail();
    };

    let slugs: IndexSet<String> = list
        .select(&link_sel)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.trim().trim_matches('/').to_string())
        .filter(|slug| !slug.is_empty())
        .collect();

    Ok(slugs.into_iter().collect())
}

/// Extracts `(route id, display name)` pairs from the route selector.
///
/// The placeholder option (value `0`) and options with a non-numeric value
/// are skipped. Duplicate ids keep their first occurrence.
pub fn parse_route_options(body: &str) -> Result<Vec<(RouteId, String)>, ProviderError> {
    let doc = Html::parse_document(body);
    let opt_sel = selector(ROUTE_OPTION_SELECTOR)?;
    let select_sel = selector(r#"select[name="bus_id"]"#)?;

    if doc.select(&select_sel).next().is_none() {
        return ParseSnafu {
            message: "route selector not found",
        }
        .fail();
    }

    let mut seen = IndexSet::new();
    let mut out = Vec::new();
    for opt in doc.select(&opt_sel) {
        let Some(value) = opt.value().attr("value").map(str::trim) else {
            continue;
        };
        if value == ROUTE_SENTINEL {
            continue;
        }
        let Ok(id) = value.parse::<RouteId>() else {
            tracing::debug!("skipping route option with value {value:?}");
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        let name = opt.text().collect::<String>().trim().to_string();
        out.push((id, name));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRONT_PAGE: &str = r#"
        <html><body>
          <div class="ui menu" aria-label=" Список городов ">
            <a class="item" href="/kazan/">Казань</a>
            <a class="item" href="/moskva/">Москва</a>
            <a class="item" href="/kazan/">Казань</a>
            <a class="other" href="/about/">О проекте</a>
          </div>
          <a class="item" href="/not-a-city/">x</a>
        </body></html>
    "#;

    const ROUTE_PAGE: &str = r#"
        <html><body><form>
          <select name="bus_id">
            <option value="0">Выберите маршрут</option>
            <option value="101">Автобус 1</option>
            <option value="205"> Троллейбус 5 </option>
            <option value="abc">broken</option>
            <option value="101">Автобус 1</option>
          </select>
          <select name="other"><option value="9">nine</option></select>
        </form></body></html>
    "#;

    #[test]
    fn city_slugs_in_page_order() {
        let slugs = parse_city_slugs(FRONT_PAGE).unwrap();
        assert_eq!(slugs, vec!["kazan", "moskva"]);
    }

    #[test]
    fn missing_city_list_is_a_parse_error() {
        let err = parse_city_slugs("<html><body></body></html>").unwrap_err();
        assert!(matches!(err, ProviderError::Parse { .. }));
    }

    #[test]
    fn route_options_skip_sentinel_and_garbage() {
        let routes = parse_route_options(ROUTE_PAGE).unwrap();
        assert_eq!(
            routes,
            vec![(101, "Автобус 1".to_string()), (205, "Троллейбус 5".to_string())]
        );
    }

    #[test]
    fn missing_route_selector_is_a_parse_error() {
        let err = parse_route_options("<select name='x'></select>").unwrap_err();
        assert!(matches!(err, ProviderError::Parse { .. }));
    }
}
