mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn tour_ratings(client: &reqwest::Client, server: &common::TestServer, id: &str) -> Result<(f64, u64)> {
    let body: Value = client
        .get(server.url(&format!("/api/v1/tours/{}", id)))
        .send()
        .await?
        .json()
        .await?;
    let tour = &body["data"]["data"];
    Ok((
        tour["ratingsAverage"].as_f64().unwrap_or_default(),
        tour["ratingsQuantity"].as_u64().unwrap_or_default(),
    ))
}

#[tokio::test]
async fn reviews_keep_tour_ratings_in_step() -> Result<()> {
    let Some(server) = common::server().await? else { return Ok(()) };
    let client = reqwest::Client::new();
    let admin = common::signup(&client, server, "Review Admin").await?;
    common::promote(&admin, "admin").await?;
    let tour = common::create_tour(&client, server, &admin, &common::tour_body(420.0)).await?;
    let tour_id = tour["id"].as_str().unwrap().to_string();

    let alice = common::signup(&client, server, "Alice Reviewer").await?;
    let bob = common::signup(&client, server, "Bob Reviewer").await?;

    let mut review_ids = Vec::new();
    for (session, rating) in [(&alice, 3), (&bob, 4)] {
        let res = client
            .post(server.url(&format!("/api/v1/tours/{}/reviews", tour_id)))
            .bearer_auth(&session.token)
            .json(&json!({ "review": "Worth every step", "rating": rating }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await?;
        assert_eq!(body["data"]["data"]["tour"], tour_id.as_str());
        assert_eq!(body["data"]["data"]["user"]["id"], session.id.as_str());
        review_ids.push((session, body["data"]["data"]["id"].as_str().unwrap().to_string()));
    }

    assert_eq!(tour_ratings(&client, server, &tour_id).await?, (3.5, 2));

    // One review per user and tour
    let duplicate = client
        .post(server.url(&format!("/api/v1/tours/{}/reviews", tour_id)))
        .bearer_auth(&alice.token)
        .json(&json!({ "review": "Again", "rating": 5 }))
        .send()
        .await?;
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    // Only the author may edit
    let (_, bob_review) = &review_ids[1];
    let res = client
        .patch(server.url(&format!("/api/v1/reviews/{}", bob_review)))
        .bearer_auth(&alice.token)
        .json(&json!({ "rating": 1 }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .patch(server.url(&format!("/api/v1/reviews/{}", bob_review)))
        .bearer_auth(&bob.token)
        .json(&json!({ "rating": 5 }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(tour_ratings(&client, server, &tour_id).await?, (4.0, 2));

    let res = client
        .get(server.url(&format!("/api/v1/tours/{}/reviews", tour_id)))
        .send()
        .await?;
    let body: Value = res.json().await?;
    assert_eq!(body["results"], 2);

    for (session, id) in &review_ids {
        let res = client
            .delete(server.url(&format!("/api/v1/reviews/{}", id)))
            .bearer_auth(&session.token)
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
    }

    assert_eq!(tour_ratings(&client, server, &tour_id).await?, (4.5, 0));
    Ok(())
}

#[tokio::test]
async fn reviews_need_the_user_role_and_valid_rating() -> Result<()> {
    let Some(server) = common::server().await? else { return Ok(()) };
    let client = reqwest::Client::new();
    let admin = common::signup(&client, server, "Busy Admin").await?;
    common::promote(&admin, "admin").await?;
    let tour = common::create_tour(&client, server, &admin, &common::tour_body(250.0)).await?;
    let url = server.url(&format!("/api/v1/tours/{}/reviews", tour["id"].as_str().unwrap()));

    let res = client
        .post(&url)
        .bearer_auth(&admin.token)
        .json(&json!({ "review": "Admins do not review", "rating": 5 }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let user = common::signup(&client, server, "Harsh Reviewer").await?;
    let res = client
        .post(&url)
        .bearer_auth(&user.token)
        .json(&json!({ "review": "Off the scale", "rating": 9 }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await?;
    assert_eq!(body["fieldErrors"]["rating"], "Rating must be below 5.0");
    Ok(())
}

#[tokio::test]
async fn concurrent_reviews_are_all_counted() -> Result<()> {
    let Some(server) = common::server().await? else { return Ok(()) };
    let client = reqwest::Client::new();
    let admin = common::signup(&client, server, "Crowd Admin").await?;
    common::promote(&admin, "admin").await?;

    let mut reviewers = Vec::new();
    for i in 0..6 {
        reviewers.push(common::signup(&client, server, &format!("Crowd Reviewer {}", i)).await?);
    }

    for round in 0..5 {
        let tour = common::create_tour(&client, server, &admin, &common::tour_body(300.0 + round as f64)).await?;
        let tour_id = tour["id"].as_str().unwrap().to_string();
        let url = server.url(&format!("/api/v1/tours/{}/reviews", tour_id));

        let mut writes = tokio::task::JoinSet::new();
        for (i, reviewer) in reviewers.iter().enumerate() {
            let client = client.clone();
            let url = url.clone();
            let token = reviewer.token.clone();
            let rating = (i % 5 + 1) as u64;
            writes.spawn(async move {
                client
                    .post(&url)
                    .bearer_auth(token)
                    .json(&json!({ "review": "Went with a crowd", "rating": rating }))
                    .send()
                    .await
                    .map(|res| res.status())
            });
        }
        while let Some(status) = writes.join_next().await {
            assert_eq!(status??, StatusCode::CREATED);
        }

        // ratings 1,2,3,4,5,1
        let (average, quantity) = tour_ratings(&client, server, &tour_id).await?;
        assert_eq!(quantity, 6, "round {}", round);
        assert!((average - 16.0 / 6.0).abs() < 1e-9, "round {}: average {}", round, average);
    }
    Ok(())
}
