use std::sync::Arc;

use canopy::application::archive::{
    ArchivedPost, ArchivedSpace, SpaceArchive, export_archive, read_archive, write_archive,
};
use canopy::application::posts::{
    CreatePostCommand, MovePostCommand, PostService, PostServiceError,
};
use canopy::application::repos::SpacesRepo;
use canopy::application::spaces::{
    CreateSpaceCommand, MoveSpaceCommand, SpaceService, SpaceServiceError, UpdateSpaceCommand,
};
use canopy::cache::SpaceCache;
use canopy::domain::error::DomainError;
use canopy::domain::spaces::{MAX_SPACE_DEPTH, SpaceId};
use canopy::infra::memory::MemoryRepositories;

struct Harness {
    repo: Arc<MemoryRepositories>,
    spaces: SpaceService,
    posts: PostService,
}

impl Harness {
    fn recursive(&self, id: SpaceId) -> i64 {
        self.spaces
            .find(id)
            .expect("space cached")
            .recursive_post_count
    }

    fn direct(&self, id: SpaceId) -> i64 {
        self.spaces.find(id).expect("space cached").post_count
    }
}

/// `1(5) -> 2(3) -> 3(2)`.
fn chain_archive() -> SpaceArchive {
    let spaces = [(1, None), (2, Some(1)), (3, Some(2))]
        .into_iter()
        .map(|(id, parent_id)| ArchivedSpace {
            id,
            name: format!("space-{id}"),
            description: String::new(),
            parent_id,
            created_at: None,
        })
        .collect();

    let mut posts = Vec::new();
    for (space_id, count) in [(1, 5), (2, 3), (3, 2)] {
        for _ in 0..count {
            posts.push(ArchivedPost {
                id: posts.len() as i64 + 1,
                space_id,
                body: format!("post in {space_id}"),
                created_at: None,
            });
        }
    }

    SpaceArchive { spaces, posts }
}

async fn harness(archive: &SpaceArchive) -> Harness {
    let repo = Arc::new(
        MemoryRepositories::from_archive(archive, MAX_SPACE_DEPTH).expect("valid archive"),
    );
    let cache = Arc::new(SpaceCache::default());
    let spaces = SpaceService::new(repo.clone(), cache.clone(), MAX_SPACE_DEPTH);
    let posts = PostService::new(repo.clone(), cache, spaces.write_gate());

    let audit = spaces
        .load_cache()
        .await
        .expect("cache loads")
        .expect("audit runs on load by default");
    assert!(audit.is_consistent(), "{audit:?}");

    Harness {
        repo,
        spaces,
        posts,
    }
}

#[tokio::test]
async fn load_seeds_recursive_counts() {
    let h = harness(&chain_archive()).await;

    assert_eq!(h.recursive(1), 10);
    assert_eq!(h.recursive(2), 5);
    assert_eq!(h.recursive(3), 2);
    assert_eq!(h.direct(1), 5);
}

#[tokio::test]
async fn move_keeps_cached_counters() {
    let h = harness(&chain_archive()).await;
    let four = h
        .spaces
        .create_space(CreateSpaceCommand {
            name: "  Elsewhere ".into(),
            description: String::new(),
            parent_id: None,
        })
        .await
        .expect("space created");
    assert_eq!(four.name, "Elsewhere");

    let moved = h
        .spaces
        .move_space(MoveSpaceCommand {
            id: 3,
            parent_id: Some(four.id),
        })
        .await
        .expect("space moved");

    assert_eq!(moved.post_count, 2);
    assert_eq!(moved.depth, 1);
    assert_eq!(h.recursive(1), 8);
    assert_eq!(h.recursive(2), 3);
    assert_eq!(h.recursive(four.id), 2);
    assert!(h.spaces.cache().audit().is_consistent());

    let stored = h
        .repo
        .find_space(3)
        .await
        .expect("lookup")
        .expect("space stored");
    assert_eq!(stored.parent_id, Some(four.id));
    assert_eq!(stored.depth, 1);
}

#[tokio::test]
async fn promoting_a_subtree_refreshes_depths() {
    let h = harness(&chain_archive()).await;

    h.spaces
        .move_space(MoveSpaceCommand {
            id: 2,
            parent_id: None,
        })
        .await
        .expect("space moved");

    assert_eq!(h.recursive(1), 5);
    assert_eq!(h.recursive(2), 5);
    assert_eq!(h.spaces.find(2).expect("cached").depth, 0);
    assert_eq!(h.spaces.find(3).expect("cached").depth, 1);
    assert_eq!(h.spaces.cache().roots(), vec![1, 2]);
}

#[tokio::test]
async fn move_beneath_own_subtree_is_rejected() {
    let h = harness(&chain_archive()).await;

    let err = h
        .spaces
        .move_space(MoveSpaceCommand {
            id: 1,
            parent_id: Some(3),
        })
        .await
        .expect_err("cycle rejected");

    assert!(matches!(err, SpaceServiceError::Cycle { id: 1 }));
    assert_eq!(h.recursive(1), 10);
}

#[tokio::test]
async fn move_respects_depth_limit() {
    let h = harness(&chain_archive()).await;
    let root = h
        .spaces
        .create_space(CreateSpaceCommand {
            name: "root".into(),
            description: String::new(),
            parent_id: None,
        })
        .await
        .expect("space created");

    let err = h
        .spaces
        .move_space(MoveSpaceCommand {
            id: 1,
            parent_id: Some(root.id),
        })
        .await
        .expect_err("too deep");

    assert!(matches!(
        err,
        SpaceServiceError::Domain(DomainError::Validation { .. })
    ));
    assert_eq!(h.spaces.find(1).expect("cached").parent_id, None);
}

#[tokio::test]
async fn create_below_deepest_level_is_rejected() {
    let h = harness(&chain_archive()).await;

    let err = h
        .spaces
        .create_space(CreateSpaceCommand {
            name: "too deep".into(),
            description: String::new(),
            parent_id: Some(3),
        })
        .await
        .expect_err("depth limit");

    assert!(matches!(err, SpaceServiceError::Domain(_)));
    assert_eq!(h.spaces.cache().len(), 3);
}

#[tokio::test]
async fn update_keeps_counters() {
    let h = harness(&chain_archive()).await;

    let updated = h
        .spaces
        .update_space(UpdateSpaceCommand {
            id: 2,
            name: "Renamed".into(),
            description: "fresh".into(),
        })
        .await
        .expect("space updated");

    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.post_count, 3);
    assert_eq!(h.recursive(2), 5);
    assert_eq!(h.spaces.cache().get_children(1), vec![2]);
}

#[tokio::test]
async fn delete_requires_an_empty_leaf() {
    let h = harness(&chain_archive()).await;

    let err = h.spaces.delete_space(2).await.expect_err("has children");
    assert!(matches!(err, SpaceServiceError::HasChildren { count: 1 }));

    let err = h.spaces.delete_space(3).await.expect_err("holds posts");
    assert!(matches!(err, SpaceServiceError::InUse { count: 2 }));

    let leaf = h
        .spaces
        .create_space(CreateSpaceCommand {
            name: "empty".into(),
            description: String::new(),
            parent_id: Some(2),
        })
        .await
        .expect("space created");
    h.spaces.delete_space(leaf.id).await.expect("space deleted");

    assert!(h.spaces.find(leaf.id).is_err());
    assert_eq!(h.spaces.cache().get_children(2), vec![3]);
    assert!(h.repo.find_space(leaf.id).await.expect("lookup").is_none());
}

#[tokio::test]
async fn post_writes_adjust_counters() {
    let h = harness(&chain_archive()).await;

    let post = h
        .posts
        .create_post(CreatePostCommand {
            space_id: 3,
            body: "another one".into(),
        })
        .await
        .expect("post created");
    assert_eq!(h.direct(3), 3);
    assert_eq!(h.recursive(1), 11);

    h.posts
        .move_post(MovePostCommand {
            id: post.id,
            space_id: 1,
        })
        .await
        .expect("post moved");
    assert_eq!(h.direct(3), 2);
    assert_eq!(h.recursive(2), 5);
    assert_eq!(h.direct(1), 6);
    assert_eq!(h.recursive(1), 11);

    h.posts.delete_post(post.id).await.expect("post deleted");
    assert_eq!(h.recursive(1), 10);
    assert!(h.spaces.cache().audit().is_consistent());
}

#[tokio::test]
async fn post_errors_leave_counters_alone() {
    let h = harness(&chain_archive()).await;

    let err = h
        .posts
        .create_post(CreatePostCommand {
            space_id: 1,
            body: "   ".into(),
        })
        .await
        .expect_err("empty body");
    assert!(matches!(err, PostServiceError::ConstraintViolation("body")));

    let err = h
        .posts
        .move_post(MovePostCommand { id: 1, space_id: 9 })
        .await
        .expect_err("unknown space");
    assert!(matches!(err, PostServiceError::UnknownSpace(9)));

    let err = h.posts.delete_post(999).await.expect_err("unknown post");
    assert!(matches!(err, PostServiceError::NotFound(999)));

    assert_eq!(h.recursive(1), 10);
}

#[tokio::test]
async fn tree_view_nests_children() {
    let h = harness(&chain_archive()).await;

    let tree = h.spaces.tree();

    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].recursive_post_count, 10);
    assert_eq!(tree[0].children[0].id, 2);
    assert_eq!(tree[0].children[0].children[0].post_count, 2);
}

#[tokio::test]
async fn archive_round_trips_through_disk() {
    let h = harness(&chain_archive()).await;
    h.spaces
        .move_space(MoveSpaceCommand {
            id: 3,
            parent_id: Some(1),
        })
        .await
        .expect("space moved");

    let exported = export_archive(h.repo.as_ref(), h.repo.as_ref())
        .await
        .expect("export");
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("spaces.toml");
    write_archive(&path, &exported).expect("archive written");

    let restored = read_archive(&path).expect("archive read");
    assert_eq!(restored, exported);
    assert_eq!(restored.spaces[2].parent_id, Some(1));

    let reloaded = harness(&restored).await;
    assert_eq!(reloaded.recursive(1), 10);
    assert_eq!(reloaded.recursive(2), 3);
}
