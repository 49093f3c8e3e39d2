//! Server-rendered pages.

use axum::response::Html;
use handlebars::{Handlebars, TemplateError};
use serde::Serialize;

use crate::error::{ClinicError, ClinicResult};

pub struct Views {
    registry: Handlebars<'static>,
}

impl Views {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();

        registry.register_partial("header", include_str!("../templates/header.hbs"))?;
        registry.register_partial("footer", include_str!("../templates/footer.hbs"))?;
        registry.register_template_string("dashboard", include_str!("../templates/dashboard.hbs"))?;
        registry.register_template_string("listing", include_str!("../templates/listing.hbs"))?;
        registry.register_template_string("login", include_str!("../templates/login.hbs"))?;

        Ok(Self { registry })
    }

    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> ClinicResult<Html<String>> {
        self.registry.render(template, data).map(Html).map_err(|e| {
            tracing::error!("Failed to render {}: {}", template, e);
            ClinicError::Internal("failed to render page")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_escapes_cell_values() {
        let views = Views::new().unwrap();
        let page = views
            .render(
                "listing",
                &json!({
                    "title": "Owners",
                    "table": "owners",
                    "view": "active",
                    "views": [{"name": "active", "selected": true}],
                    "columns": ["Name"],
                    "rows": [["<b>Ana</b>"]],
                }),
            )
            .unwrap();

        assert!(page.0.contains("&lt;b&gt;Ana&lt;/b&gt;"));
        assert!(page.0.contains("class=\"selected\""));
    }

    #[test]
    fn empty_listing_says_so() {
        let views = Views::new().unwrap();
        let page = views
            .render(
                "listing",
                &json!({
                    "title": "Inactive owners",
                    "table": "owners",
                    "view": "inactive",
                    "views": [],
                    "columns": ["Name"],
                    "rows": [],
                }),
            )
            .unwrap();

        assert!(page.0.contains("No inactive owners."));
    }
}
