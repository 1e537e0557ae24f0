use std::collections::HashSet;

use reqwest::Url;

use crate::error::Error;
use crate::types::{HybridTarget, Target, TargetKind};

/// Public API and web-app targets owned by the automation project.
pub fn automation_targets() -> Vec<Target> {
    vec![
        Target::new(
            "JSONPlaceholder API",
            "https://jsonplaceholder.typicode.com",
            TargetKind::Api,
            "automation",
        )
        .with_description("Public REST API for testing - posts, users, comments")
        .with_endpoints(["/posts", "/users", "/comments", "/albums", "/photos"]),
        Target::new("ReqRes API", "https://reqres.in/api", TargetKind::Api, "automation")
            .with_description("Public API for testing REST endpoints")
            .with_endpoints(["/users", "/users/2", "/login", "/register"]),
        Target::new("HTTPBin API", "https://httpbin.org", TargetKind::Api, "automation")
            .with_description("HTTP Request & Response Service")
            .with_endpoints(["/get", "/post", "/status/200", "/delay/1"]),
        Target::new(
            "SauceDemo Web App",
            "https://www.saucedemo.com",
            TargetKind::WebApp,
            "automation",
        )
        .with_description("E-commerce demo application for testing")
        .with_endpoints(["/"]),
        Target::new("BlazeDemo", "https://blazedemo.com", TargetKind::WebApp, "automation")
            .with_description("Travel booking demo application")
            .with_endpoints(["/"]),
    ]
}

/// Locally hosted intentionally vulnerable services owned by the pentesting project.
pub fn pentesting_targets() -> Vec<Target> {
    vec![
        Target::new(
            "OWASP Juice Shop",
            "http://localhost:3000",
            TargetKind::WebApp,
            "pentesting",
        )
        .with_description("Modern vulnerable web application")
        .with_endpoints(["/", "/api/products", "/rest/products/search"]),
        Target::new("DVWA", "http://localhost:8080", TargetKind::WebApp, "pentesting")
            .with_description("Damn Vulnerable Web Application")
            .with_endpoints(["/"]),
        Target::new("Booking API", "http://localhost:5000", TargetKind::Api, "pentesting")
            .with_description("Vulnerable booking API")
            .with_endpoints(["/api/health", "/api/login", "/api/bookings", "/api/flights"]),
        Target::new("Banking API", "http://localhost:5001", TargetKind::Api, "pentesting")
            .with_description("Vulnerable banking API")
            .with_endpoints(["/api/health", "/api/login", "/api/accounts", "/api/transactions"]),
        Target::new(
            "Corporate Financial API",
            "http://localhost:7000",
            TargetKind::Api,
            "pentesting",
        )
        .with_description("Financial statements API")
        .with_endpoints([
            "/api/auth/login",
            "/api/financial/statements",
            "/api/financial/documents",
        ]),
        Target::new("VulnAPI", "http://localhost:5002", TargetKind::Api, "pentesting")
            .with_description("Vulnerable REST API for security testing")
            .with_endpoints(["/"]),
    ]
}

/// The full built-in registry, automation targets first.
pub fn builtin_targets() -> Vec<Target> {
    let mut targets = automation_targets();
    targets.extend(pentesting_targets());
    targets
}

pub fn builtin_hybrid_targets() -> Vec<HybridTarget> {
    vec![
        HybridTarget {
            url: "http://localhost:3000".into(),
            endpoints: vec!["/rest/products/search".into(), "/api/users/".into()],
            parameter: "q".into(),
        },
        HybridTarget {
            url: "http://localhost:8080".into(),
            endpoints: vec!["/vulnerabilities/sqli/".into(), "/vulnerabilities/xss/".into()],
            parameter: "id".into(),
        },
    ]
}

/// Use the configured targets when any are given, otherwise the built-in list.
pub fn load_targets(configured: &[Target]) -> Result<Vec<Target>, Error> {
    let targets = if configured.is_empty() {
        builtin_targets()
    } else {
        configured.to_vec()
    };
    validate_targets(&targets)?;
    Ok(targets)
}

/// Names must be unique and URLs absolute http(s).
pub fn validate_targets(targets: &[Target]) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for t in targets {
        if !seen.insert(t.name.as_str()) {
            return Err(Error::InvalidTarget {
                name: t.name.clone(),
                reason: "duplicate name".into(),
            });
        }
        validate_url(&t.name, &t.url)?;
    }
    Ok(())
}

pub fn validate_url(name: &str, url: &str) -> Result<Url, Error> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidTarget {
        name: name.to_string(),
        reason: format!("invalid url {url}: {e}"),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(Error::InvalidTarget {
            name: name.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_is_valid() {
        let targets = builtin_targets();
        assert_eq!(targets.len(), 11);
        validate_targets(&targets).unwrap();
        assert!(targets.iter().all(|t| !t.endpoints.is_empty()));
    }

    #[test]
    fn automation_targets_come_first() {
        let targets = builtin_targets();
        assert_eq!(targets[0].project, "automation");
        assert_eq!(targets.last().unwrap().project, "pentesting");
    }

    #[test]
    fn configured_targets_replace_builtins() {
        let custom = vec![Target::new("mine", "http://127.0.0.1:9", TargetKind::Endpoint, "local")];
        let loaded = load_targets(&custom).unwrap();
        assert_eq!(loaded, custom);
    }

    #[test]
    fn rejects_duplicates_and_bad_schemes() {
        let dup = vec![
            Target::new("a", "http://x", TargetKind::Api, "p"),
            Target::new("a", "http://y", TargetKind::Api, "p"),
        ];
        assert!(matches!(validate_targets(&dup), Err(Error::InvalidTarget { .. })));

        let ftp = vec![Target::new("f", "ftp://x", TargetKind::Api, "p")];
        assert!(validate_targets(&ftp).is_err());

        let junk = vec![Target::new("j", "not a url", TargetKind::Api, "p")];
        assert!(validate_targets(&junk).is_err());
    }
}
