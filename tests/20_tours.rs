mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn only_editors_create_tours() -> Result<()> {
    let Some(server) = common::server().await? else { return Ok(()) };
    let client = reqwest::Client::new();
    let user = common::signup(&client, server, "Plain Tester").await?;

    let res = client
        .post(server.url("/api/v1/tours"))
        .bearer_auth(&user.token)
        .json(&common::tour_body(500.0))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "You do not have permission to perform this action");
    Ok(())
}

#[tokio::test]
async fn created_tour_has_slug_and_defaults() -> Result<()> {
    let Some(server) = common::server().await? else { return Ok(()) };
    let client = reqwest::Client::new();
    let admin = common::signup(&client, server, "Tour Admin").await?;
    common::promote(&admin, "lead-guide").await?;

    let body = common::tour_body(650.0);
    let tour = common::create_tour(&client, server, &admin, &body).await?;

    let expected_slug = body["name"].as_str().unwrap().to_lowercase().replace(' ', "-");
    assert_eq!(tour["slug"], expected_slug);
    assert_eq!(tour["ratingsAverage"], json!(4.5));
    assert_eq!(tour["ratingsQuantity"], json!(0));
    assert_eq!(tour["durationWeeks"].as_f64(), Some(5.0 / 7.0));
    Ok(())
}

#[tokio::test]
async fn invalid_tours_are_rejected_with_field_errors() -> Result<()> {
    let Some(server) = common::server().await? else { return Ok(()) };
    let client = reqwest::Client::new();
    let admin = common::signup(&client, server, "Strict Admin").await?;
    common::promote(&admin, "admin").await?;

    let mut body = common::tour_body(100.0);
    body["difficulty"] = json!("extreme");
    body["priceDiscount"] = json!(150);

    let res = client
        .post(server.url("/api/v1/tours"))
        .bearer_auth(&admin.token)
        .json(&body)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["status"], "fail");
    assert_eq!(body["fieldErrors"]["difficulty"], "Difficulty is either: easy, medium, difficult");
    assert!(body["fieldErrors"]["priceDiscount"].is_string());
    Ok(())
}

#[tokio::test]
async fn tours_sort_by_price_descending() -> Result<()> {
    let Some(server) = common::server().await? else { return Ok(()) };
    let client = reqwest::Client::new();
    let admin = common::signup(&client, server, "Sorting Admin").await?;
    common::promote(&admin, "admin").await?;
    for price in [120.0, 980.0, 455.0] {
        common::create_tour(&client, server, &admin, &common::tour_body(price)).await?;
    }

    let res = client
        .get(server.url("/api/v1/tours?sort=-price&fields=name,price&limit=1000"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let tours = body["data"]["data"].as_array().expect("tour list");
    assert_eq!(body["results"].as_u64(), Some(tours.len() as u64));
    assert!(tours.len() >= 3);

    let prices: Vec<f64> = tours.iter().filter_map(|t| t["price"].as_f64()).collect();
    assert!(prices.windows(2).all(|w| w[0] >= w[1]), "{:?}", prices);
    assert!(tours.iter().all(|t| t.get("summary").is_none()));
    Ok(())
}

#[tokio::test]
async fn price_filters_and_unknown_fields() -> Result<()> {
    let Some(server) = common::server().await? else { return Ok(()) };
    let client = reqwest::Client::new();

    let res = client
        .get(server.url("/api/v1/tours?price[lt]=300&limit=1000"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    for tour in body["data"]["data"].as_array().expect("tour list") {
        assert!(tour["price"].as_f64().unwrap() < 300.0);
    }

    let res = client.get(server.url("/api/v1/tours?colour=blue")).send().await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Values the column type cannot hold are client errors, not 500s
    for query in ["duration[gte]=99999999999", "duration=abc"] {
        let res = client.get(server.url(&format!("/api/v1/tours?{}", query))).send().await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{}", query);
        let body: Value = res.json().await?;
        assert_eq!(body["status"], "fail");
    }
    Ok(())
}

#[tokio::test]
async fn secret_tours_stay_hidden() -> Result<()> {
    let Some(server) = common::server().await? else { return Ok(()) };
    let client = reqwest::Client::new();
    let admin = common::signup(&client, server, "Secret Admin").await?;
    common::promote(&admin, "admin").await?;

    let mut body = common::tour_body(777.0);
    body["secretTour"] = json!(true);
    let tour = common::create_tour(&client, server, &admin, &body).await?;
    let id = tour["id"].as_str().unwrap();

    let res = client.get(server.url(&format!("/api/v1/tours/{}", id))).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await?;
    assert_eq!(body["message"], "No document found with that ID");
    Ok(())
}

#[tokio::test]
async fn geo_and_aggregate_endpoints() -> Result<()> {
    let Some(server) = common::server().await? else { return Ok(()) };
    let client = reqwest::Client::new();
    let admin = common::signup(&client, server, "Geo Admin").await?;
    common::promote(&admin, "admin").await?;
    let tour = common::create_tour(&client, server, &admin, &common::tour_body(300.0)).await?;

    // Start location is at Banff; Calgary is about 110 km away
    let res = client
        .get(server.url("/api/v1/tours/tours-within/200/center/51.0447,-114.0719/unit/km"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let ids: Vec<&str> = body["data"]["tours"].as_array().unwrap().iter().filter_map(|t| t["id"].as_str()).collect();
    assert!(ids.contains(&tour["id"].as_str().unwrap()));

    let res = client
        .get(server.url("/api/v1/tours/distances/51.0447,-114.0719/unit/km"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    let distance = body["data"]["distances"]
        .as_array()
        .unwrap()
        .iter()
        .find(|d| d["id"] == tour["id"])
        .and_then(|d| d["distance"].as_f64())
        .expect("distance to new tour");
    assert!((100.0..130.0).contains(&distance), "{}", distance);

    let res = client.get(server.url("/api/v1/tours/tour-stats")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert!(body["data"]["stats"].is_array());

    let res = client
        .get(server.url("/api/v1/tours/monthly-tours/2021"))
        .bearer_auth(&admin.token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert!(body["data"]["plan"].as_array().unwrap().len() <= 6);
    Ok(())
}
