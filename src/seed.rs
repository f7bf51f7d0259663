use tracing::info;

use crate::core::db::Db;
use crate::core::helpers::{hash_password, new_id, now};
use crate::follow::{update_follow_edge, EdgeChange};
use crate::models::models::{Post, User};

struct DemoUser {
    username: &'static str,
    bio: &'static str,
    posts: &'static [&'static str],
}

const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        username: "test",
        bio: "Test user bio",
        posts: &["This is my first post on Bord!"],
    },
    DemoUser {
        username: "alice",
        bio: "Hello, I'm Alice!",
        posts: &[
            "Welcome to my board! Excited to share thoughts here.",
            "Just finished an amazing project. Feeling productive today!",
        ],
    },
    DemoUser {
        username: "bob",
        bio: "Bob's corner of the internet",
        posts: &["Hey everyone! Just joined Bord, looking forward to connecting with you all."],
    },
];

/// Password shared by every demo account.
pub const DEMO_PASSWORD: &str = "password";

/// Creates the demo accounts and their posts, and makes `test` follow `bob`.
/// Accounts that already exist are left untouched, so running it twice is
/// harmless.
pub fn seed_demo_data(db: &Db) -> anyhow::Result<()> {
    let mut created = 0;

    for demo in DEMO_USERS {
        if db.find_user_by_username(demo.username)?.is_some() {
            continue;
        }

        let created_at = now();
        let user = User {
            id: new_id(),
            username: demo.username.to_string(),
            email: format!("{}@bord.local", demo.username),
            password_hash: hash_password(DEMO_PASSWORD)?,
            bio: Some(demo.bio.to_string()),
            profile_image: None,
            followers: Default::default(),
            following: Default::default(),
            refresh_token: None,
            created_at,
            updated_at: created_at,
        };
        if !db.insert_user(&user)? {
            continue;
        }

        for content in demo.posts {
            let posted_at = now();
            db.insert_post(&Post {
                id: new_id(),
                content: content.to_string(),
                image: None,
                owner: user.id.clone(),
                comments: Vec::new(),
                likes: Default::default(),
                created_at: posted_at,
                updated_at: posted_at,
            })?;
        }
        created += 1;
    }

    if let (Some(test), Some(bob)) = (
        db.find_user_by_username("test")?,
        db.find_user_by_username("bob")?,
    ) {
        update_follow_edge(db, &test.id, &bob.id, EdgeChange::Add)
            .map_err(|e| anyhow::anyhow!("seeding follow edge: {e}"))?;
    }

    info!(created, "Demo data seeded");
    Ok(())
}
