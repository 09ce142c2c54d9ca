#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use crate::error::AppError;
    use crate::git::{
        parse_remote_listing, parse_remote_url, provider_for_host, GitClient,
    };

    #[test]
    fn remote_listing_keeps_only_fetch_lines_and_dedupes_by_name() {
        let listing = "\
origin\tgit@github.com:acme/widget.git (fetch)
origin\tgit@github.com:acme/widget.git (push)
upstream\thttps://gitlab.com/acme/widget.git (fetch)
upstream\thttps://gitlab.com/acme/widget.git (push)
";
        let remotes = parse_remote_listing(listing);
        assert_eq!(remotes.len(), 2);
        // Discovery order is preserved; the first remote is the primary one
        assert_eq!(remotes[0].name, "origin");
        assert_eq!(remotes[0].provider.as_deref(), Some("github"));
        assert_eq!(remotes[0].owner.as_deref(), Some("acme"));
        assert_eq!(remotes[0].repo.as_deref(), Some("widget"));
        assert_eq!(remotes[1].name, "upstream");
        assert_eq!(remotes[1].provider.as_deref(), Some("gitlab"));
    }

    #[test]
    fn remote_listing_tolerates_garbage_lines() {
        let remotes = parse_remote_listing("\n\nnot-a-remote\norigin\n");
        assert!(remotes.is_empty());
    }

    #[test]
    fn ssh_remote_urls_parse() {
        let parsed = parse_remote_url("git@github.com:acme/widget.git").unwrap();
        assert_eq!(parsed.host, "github.com");
        assert_eq!(parsed.owner, "acme");
        assert_eq!(parsed.repo, "widget");
        assert_eq!(parsed.provider.as_deref(), Some("github"));

        // Without the .git suffix
        let parsed = parse_remote_url("git@bitbucket.org:team/tool").unwrap();
        assert_eq!(parsed.repo, "tool");
        assert_eq!(parsed.provider.as_deref(), Some("bitbucket"));
    }

    #[test]
    fn https_remote_urls_parse() {
        let parsed = parse_remote_url("https://github.com/acme/widget.git").unwrap();
        assert_eq!(parsed.host, "github.com");
        assert_eq!(parsed.owner, "acme");
        assert_eq!(parsed.repo, "widget");

        let parsed = parse_remote_url("https://user@gitlab.example.io/group/proj").unwrap();
        assert_eq!(parsed.host, "gitlab.example.io");
        assert_eq!(parsed.provider.as_deref(), Some("gitlab"));
    }

    #[test]
    fn unparseable_remote_urls_yield_none() {
        assert!(parse_remote_url("").is_none());
        assert!(parse_remote_url("just-a-name").is_none());
        assert!(parse_remote_url("https://host-only.example/").is_none());
    }

    #[test]
    fn provider_classification_is_substring_based() {
        assert_eq!(provider_for_host("github.com").as_deref(), Some("github"));
        assert_eq!(provider_for_host("GITLAB.example.io").as_deref(), Some("gitlab"));
        assert_eq!(provider_for_host("bitbucket.org").as_deref(), Some("bitbucket"));
        assert_eq!(provider_for_host("git.sr.ht"), None);
    }

    #[test]
    fn marker_check_requires_the_marker_directory() {
        let temp = TempDir::new().unwrap();
        assert!(!GitClient::is_repo(temp.path()));
        // A plain file named .git does not count
        fs::write(temp.path().join(".git"), "gitdir: elsewhere").unwrap();
        assert!(!GitClient::is_repo(temp.path()));

        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        assert!(GitClient::is_repo(temp.path()));
    }

    #[tokio::test]
    async fn metadata_extraction_degrades_on_non_repos() {
        let temp = TempDir::new().unwrap();
        let client = GitClient::new(2000);

        let meta = client.collect(temp.path()).await;
        assert!(meta.branch.is_none());
        assert!(meta.commit.is_none());
        assert!(meta.remotes.is_empty());
    }

    #[tokio::test]
    async fn metadata_extraction_never_fails_on_a_broken_marker() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        // Extremely short timeout: every field must degrade, not error
        let client = GitClient::new(1);
        let meta = client.collect(temp.path()).await;
        assert!(meta.branch.is_none());
        assert!(meta.commit.is_none());
        assert!(meta.remotes.is_empty());
    }

    #[tokio::test]
    async fn checkout_refuses_non_repositories() {
        let temp = TempDir::new().unwrap();
        let client = GitClient::new(2000);
        let err = client.checkout_branch(temp.path(), "main").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
