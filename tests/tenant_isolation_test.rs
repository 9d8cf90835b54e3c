// ==========================================
// 租户隔离测试
// ==========================================
// 测试目标:
// - 同一业务主键在不同组织互不冲突
// - 引用解析只看本组织的记录
// - 预演与执行使用同一组织视图
// ==========================================

use case_migration::engine::ExecutionOptions;
use case_migration::{BatchRequest, BatchStatus, EntityType, IssueKind, MappingConfig, MigrationApi};
use tempfile::NamedTempFile;

const ACCOUNTS: &str = "external_id,name\nA1,Acme\n";
const CONTACTS: &str = "external_id,account_ref,last_name\nP1,A1,Lee\n";

fn setup() -> (NamedTempFile, MigrationApi) {
    let file = NamedTempFile::new().expect("临时文件创建失败");
    let path = file.path().to_str().unwrap().to_string();
    let api = MigrationApi::open(&path).expect("迁移API初始化失败");
    (file, api)
}

fn request(organization_id: &str) -> BatchRequest {
    BatchRequest {
        organization_id: organization_id.to_string(),
        user_id: "admin".to_string(),
        source_system_name: "LegacyCMS".to_string(),
    }
}

async fn import(api: &MigrationApi, organization_id: &str, entity_type: EntityType, text: &str) {
    let file = api
        .parse_upload(entity_type, "upload.csv", text.as_bytes())
        .unwrap();
    let result = api
        .execute(
            &request(organization_id),
            &[file],
            &MappingConfig::new(organization_id),
            ExecutionOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result.batch.status, BatchStatus::Completed, "{}", organization_id);
    assert_eq!(result.batch.successful_records, 1, "{}", organization_id);
}

#[tokio::test]
async fn test_same_natural_key_in_two_organizations() {
    let (_file, api) = setup();
    import(&api, "org-a", EntityType::Accounts, ACCOUNTS).await;

    // org-b 的联系人不能引用 org-a 的客户
    let contacts = api
        .parse_upload(EntityType::Contacts, "contacts.csv", CONTACTS.as_bytes())
        .unwrap();
    let preview = api
        .preview(std::slice::from_ref(&contacts), &MappingConfig::new("org-b"))
        .await
        .unwrap();
    assert!(!preview.success);
    assert_eq!(preview.reference_conflicts().len(), 1);

    // org-b 自己的 A1 按新建处理
    let accounts = api
        .parse_upload(EntityType::Accounts, "accounts.csv", ACCOUNTS.as_bytes())
        .unwrap();
    let preview = api
        .preview(&[accounts], &MappingConfig::new("org-b"))
        .await
        .unwrap();
    assert!(preview.success);
    assert_eq!(preview.records_to_create, 1);
    assert!(preview.issues_of_kind(IssueKind::DuplicateKey).is_empty());

    import(&api, "org-b", EntityType::Accounts, ACCOUNTS).await;
    import(&api, "org-b", EntityType::Contacts, CONTACTS).await;

    // org-a 仍只能看到自己的客户
    let preview = api
        .preview(&[contacts], &MappingConfig::new("org-a"))
        .await
        .unwrap();
    assert!(preview.success);
    assert_eq!(preview.records_to_create, 1);
}
