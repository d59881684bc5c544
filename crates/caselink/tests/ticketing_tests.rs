//! Ticketing client and token manager against a mock server

use caselink::config::TicketingConfig;
use caselink::ticketing::{AssetLookup, CaseApi, NewCase, TicketingClient};
use caselink::token::{basic_header, TokenManager, TOKEN_EXPIRY_SKEW_SECS};
use caselink_shared::{ApiError, AuthError, Credentials, ResolvedAccount};
use httpmock::prelude::*;
use serde_json::json;

const ASSET_PATH: &str = "/api/now/table/alm_ai_system_digital_asset";

fn basic_account(server: &MockServer) -> ResolvedAccount {
    ResolvedAccount {
        account_name: "prod".to_string(),
        instance: "prod".to_string(),
        base_url: server.base_url(),
        username: "svc".to_string(),
        credentials: Credentials::Basic {
            password: "pw".to_string(),
        },
    }
}

fn oauth_account(server: &MockServer) -> ResolvedAccount {
    ResolvedAccount {
        credentials: Credentials::OAuth {
            client_id: "cid".to_string(),
            client_secret: "csecret".to_string(),
            password: Some("pw".to_string()),
        },
        ..basic_account(server)
    }
}

fn client(account: ResolvedAccount) -> TicketingClient {
    let settings = TicketingConfig {
        timeout_secs: 5,
        ..TicketingConfig::default()
    };
    TicketingClient::new(account, settings).unwrap()
}

// === Asset lookup ===

#[test]
fn filtered_query_hit_skips_scan() {
    let server = MockServer::start();
    let filtered = server.mock(|when, then| {
        when.method(GET)
            .path(ASSET_PATH)
            .query_param("sysparm_query", "display_name=bot")
            .header("Authorization", basic_header("svc", "pw"));
        then.status(200)
            .json_body(json!({"result": [{"sys_id": "a1", "display_name": "bot"}]}));
    });
    let scan = server.mock(|when, then| {
        when.method(GET).path(ASSET_PATH).query_param("sysparm_limit", "1000");
        then.status(200).json_body(json!({"result": []}));
    });

    let found = client(basic_account(&server)).find_asset("bot").unwrap();
    assert_eq!(found.unwrap().sys_id, "a1");
    filtered.assert_hits(1);
    scan.assert_hits(0);
}

#[test]
fn forbidden_query_falls_back_to_scan() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path(ASSET_PATH)
            .query_param("sysparm_query", "display_name=Support-Bot");
        then.status(403).body("query ACL");
    });
    let scan = server.mock(|when, then| {
        when.method(GET).path(ASSET_PATH).query_param("sysparm_limit", "1000");
        then.status(200).json_body(json!({"result": [
            {"sys_id": "a0", "display_name": "other", "name": "other"},
            {"sys_id": "a2", "display_name": "", "name": "support-bot"}
        ]}));
    });

    let found = client(basic_account(&server))
        .find_asset("Support-Bot")
        .unwrap()
        .unwrap();
    assert_eq!(found.sys_id, "a2");
    scan.assert_hits(1);
}

#[test]
fn empty_query_falls_back_to_scan_and_may_find_nothing() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path(ASSET_PATH)
            .query_param("sysparm_query", "display_name=ghost");
        then.status(200).json_body(json!({"result": []}));
    });
    let scan = server.mock(|when, then| {
        when.method(GET).path(ASSET_PATH).query_param("sysparm_limit", "1000");
        then.status(200)
            .json_body(json!({"result": [{"sys_id": "a0", "display_name": "other"}]}));
    });

    assert!(client(basic_account(&server))
        .find_asset("ghost")
        .unwrap()
        .is_none());
    scan.assert_hits(1);
}

#[test]
fn filtered_row_for_another_name_is_not_accepted() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path(ASSET_PATH)
            .query_param("sysparm_query", "display_name=bot");
        then.status(200)
            .json_body(json!({"result": [{"sys_id": "other", "display_name": "payroll-bot"}]}));
    });
    let scan = server.mock(|when, then| {
        when.method(GET).path(ASSET_PATH).query_param("sysparm_limit", "1000");
        then.status(200).json_body(json!({"result": []}));
    });

    assert!(client(basic_account(&server))
        .find_asset("bot")
        .unwrap()
        .is_none());
    scan.assert_hits(1);
}

#[test]
fn query_operators_in_names_skip_the_filtered_query() {
    let server = MockServer::start();
    let filtered = server.mock(|when, then| {
        when.method(GET).path(ASSET_PATH).query_param("sysparm_limit", "1");
        then.status(200)
            .json_body(json!({"result": [{"sys_id": "victim", "display_name": "payroll-bot"}]}));
    });
    let scan = server.mock(|when, then| {
        when.method(GET).path(ASSET_PATH).query_param("sysparm_limit", "1000");
        then.status(200).json_body(json!({"result": [
            {"sys_id": "victim", "display_name": "payroll-bot", "name": "payroll-bot"}
        ]}));
    });

    let found = client(basic_account(&server))
        .find_asset("x^ORdisplay_nameISNOTEMPTY")
        .unwrap();
    assert!(found.is_none());
    filtered.assert_hits(0);
    scan.assert_hits(1);
}

#[test]
fn scan_failure_is_surfaced() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(ASSET_PATH);
        then.status(500).body("down");
    });

    let err = client(basic_account(&server)).find_asset("bot").unwrap_err();
    assert!(matches!(err, ApiError::HttpStatus { code: 500, .. }));
}

// === Case creation ===

#[test]
fn create_case_sends_case_fields() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/api/now/table/sn_ai_case_mgmt_ai_case")
            .json_body(json!({
                "short_description": "AI event e1",
                "type": "AI Case",
                "description": "details",
                "u_source": "caselink"
            }));
        then.status(201)
            .json_body(json!({"result": {"sys_id": "c1", "number": "AICASE0001"}}));
    });

    let api = client(basic_account(&server));
    let created = api
        .create_case(&NewCase {
            short_description: "AI event e1".to_string(),
            description: "details".to_string(),
        })
        .unwrap();
    assert_eq!(created.sys_id, "c1");
    assert_eq!(created.number, "AICASE0001");
    assert!(api.case_url("prod", "c1").ends_with("/sn_ai_case_mgmt_ai_case/c1"));
    create.assert_hits(1);
}

// === OAuth tokens ===

#[test]
fn token_refreshes_inside_expiry_skew() {
    let server = MockServer::start();
    let token = server.mock(|when, then| {
        when.method(POST)
            .path("/oauth_token.do")
            .body_contains("client_secret=csecret");
        then.status(200)
            .json_body(json!({"access_token": "t", "expires_in": "1000"}));
    });

    let tokens = TokenManager::new(5).unwrap();
    let account = oauth_account(&server);

    assert_eq!(tokens.authorization_at(&account, 0).unwrap(), "Bearer t");
    assert_eq!(tokens.cached().unwrap().expires_at, 1000);

    tokens
        .authorization_at(&account, 1000 - TOKEN_EXPIRY_SKEW_SECS - 1)
        .unwrap();
    token.assert_hits(1);

    tokens
        .authorization_at(&account, 1000 - TOKEN_EXPIRY_SKEW_SECS)
        .unwrap();
    token.assert_hits(2);
}

#[test]
fn rejected_token_keeps_status_and_body() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/oauth_token.do");
        then.status(401).body("invalid_client");
    });

    let tokens = TokenManager::new(5).unwrap();
    let err = tokens
        .authorization_at(&oauth_account(&server), 0)
        .unwrap_err();
    assert_eq!(
        err,
        AuthError::Rejected {
            status: 401,
            body: "invalid_client".to_string()
        }
    );
    assert!(tokens.cached().is_none());
}
