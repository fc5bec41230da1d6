// End-to-end tests for the primary entry form against an in-memory page

use pretty_assertions::assert_eq;

use formpilot::dictionary::DictionaryKind;
use formpilot::form::FormController;
use formpilot::types::{FieldKind, FieldSpec, RowRecord};

mod common;
use common::{Action, MockDictionary, MockPage, portal_config, portal_page};

fn dictionary() -> MockDictionary {
    MockDictionary::new()
        .diagnosis("感冒", "急性上呼吸道感染", "J06.900")
        .diagnosis("发热", "发热", "R50.900")
        .diagnosis("咳嗽", "咳嗽", "R05.X00")
}

fn full_row() -> RowRecord {
    RowRecord::new()
        .with("姓名", "张三")
        .with("性别", "男")
        .with("年龄", "45岁")
        .with("科室", "内科 门诊")
        .with("诊断", "感冒，发热,咳嗽")
        .with("药品品种数", "3.0")
        .with("注射剂", "有")
        .with("备注", "复诊")
}

#[tokio::test]
async fn test_full_row_is_filled_and_submitted() {
    let config = portal_config();
    let (page, _) = portal_page();
    let dictionary = dictionary();

    let outcome = FormController::new(&page, &dictionary, &config)
        .process(&full_row())
        .await;
    assert!(outcome.succeeded, "{:?}", outcome.failure_reason);

    assert_eq!(
        page.actions_on("patient_name"),
        vec![
            Action::Clear("patient_name".into()),
            Action::Type("patient_name".into(), "张三".into())
        ]
    );
    assert_eq!(page.clicks("sex=男"), 1);
    assert!(!page.touched("sex=女"));
    assert_eq!(
        page.actions_on("age_unit"),
        vec![Action::Select("age_unit".into(), "岁".into())]
    );
    assert_eq!(
        page.actions_on("age"),
        vec![Action::Clear("age".into()), Action::Type("age".into(), "45".into())]
    );
    assert_eq!(
        page.actions_on("department"),
        vec![Action::Select("department".into(), "内科".into())]
    );
    assert!(page.actions().contains(&Action::Type("drug_variety_count".into(), "3".into())));
    assert_eq!(page.clicks("injectable=有"), 1);
    assert!(page.actions().contains(&Action::Type("injectable_count".into(), "1".into())));
    assert!(!page.touched("remark"));

    // Submit comes last and its confirmation is accepted
    let actions = page.actions();
    let tail = &actions[actions.len() - 2..];
    assert_eq!(
        tail,
        &[Action::Click("submit".into()), Action::Dialog("提交成功".into())]
    );
    assert!(!page.touched("reset"));
}

#[tokio::test]
async fn test_age_unit_is_filled_before_the_number() {
    let config = portal_config();
    let (page, _) = portal_page();

    let row = RowRecord::new().with("年龄", "45岁");
    let outcome = FormController::new(&page, &MockDictionary::new(), &config)
        .process(&row)
        .await;
    assert!(outcome.succeeded);

    let order: Vec<String> = page
        .actions()
        .iter()
        .filter_map(|a| a.target().map(str::to_string))
        .collect();
    assert_eq!(order, vec!["age_unit", "age", "age", "submit"]);
}

#[tokio::test]
async fn test_diagnoses_fan_out_over_slots() {
    let config = portal_config();
    let (page, _) = portal_page();
    let dictionary = dictionary();

    let row = RowRecord::new().with("诊断", "感冒，发热,咳嗽");
    let outcome = FormController::new(&page, &dictionary, &config)
        .process(&row)
        .await;
    assert!(outcome.succeeded);

    let calls = dictionary.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(kind, _, cookie)| {
        *kind == DictionaryKind::Diagnosis && cookie.as_deref() == Some("JSESSIONID=abc123")
    }));

    // Resolved values are assigned, never typed
    assert_eq!(
        page.actions_on("diagnosis1_name"),
        vec![Action::Assign("diagnosis1_name".into(), "急性上呼吸道感染".into())]
    );
    assert_eq!(
        page.actions_on("diagnosis1_code"),
        vec![Action::Assign("diagnosis1_code".into(), "J06.900".into())]
    );
    assert_eq!(
        page.actions_on("diagnosis3_code"),
        vec![Action::Assign("diagnosis3_code".into(), "R05.X00".into())]
    );
    for slot in 4..=5 {
        assert!(!page.touched(&format!("diagnosis{}_name", slot)));
        assert!(!page.touched(&format!("diagnosis{}_code", slot)));
    }
}

#[tokio::test]
async fn test_unresolved_diagnosis_leaves_its_slot_empty() {
    let config = portal_config();
    let (page, _) = portal_page();
    let dictionary = dictionary();

    let row = RowRecord::new().with("诊断", "罕见病,感冒");
    let outcome = FormController::new(&page, &dictionary, &config)
        .process(&row)
        .await;

    assert!(outcome.succeeded);
    assert_eq!(dictionary.calls().len(), 2);
    assert!(!page.touched("diagnosis1_name"));
    assert_eq!(
        page.actions_on("diagnosis2_name"),
        vec![Action::Assign("diagnosis2_name".into(), "急性上呼吸道感染".into())]
    );
}

#[tokio::test]
async fn test_blank_values_touch_nothing() {
    let config = portal_config();
    let (page, _) = portal_page();
    let dictionary = dictionary();

    let row = RowRecord::new()
        .with("姓名", "")
        .with("年龄", "   ")
        .with("诊断", "")
        .with("性别", "\t");
    let outcome = FormController::new(&page, &dictionary, &config)
        .process(&row)
        .await;

    assert!(outcome.succeeded);
    assert!(dictionary.calls().is_empty());
    assert_eq!(
        page.actions(),
        vec![Action::Click("submit".into()), Action::Dialog("提交成功".into())]
    );
}

#[tokio::test]
async fn test_radio_already_selected_is_not_clicked() {
    let config = portal_config();
    let page = MockPage::new();
    let male = page.add(
        config.field_spec("sex").unwrap().query().with_value("1"),
        "sex=男",
    );
    page.set_selected(male);
    page.add_id("btnSubmit", "submit");

    let row = RowRecord::new().with("性别", "男");
    let outcome = FormController::new(&page, &MockDictionary::new(), &config)
        .process(&row)
        .await;

    assert!(outcome.succeeded);
    assert_eq!(page.clicks("sex=男"), 0);
}

#[tokio::test]
async fn test_injectable_absent_sets_no_count() {
    let config = portal_config();
    let (page, _) = portal_page();

    let row = RowRecord::new().with("注射剂", "无");
    FormController::new(&page, &MockDictionary::new(), &config)
        .process(&row)
        .await;

    assert_eq!(page.clicks("injectable=无"), 1);
    assert!(!page.touched("injectable_count"));
}

#[tokio::test]
async fn test_missing_dialog_is_not_an_error() {
    let config = portal_config();
    let page = MockPage::new();
    page.add_id("brxm", "patient_name");
    page.add_id("btnSubmit", "submit");

    let row = RowRecord::new().with("姓名", "李四");
    let outcome = FormController::new(&page, &MockDictionary::new(), &config)
        .process(&row)
        .await;

    assert!(outcome.succeeded);
    assert!(!page.actions().iter().any(|a| matches!(a, Action::Dialog(_))));
}

#[tokio::test]
async fn test_missing_element_resets_the_form() {
    let mut config = portal_config();
    config.form_elements.insert(
        "ward".to_string(),
        FieldSpec::new(FieldKind::Text, Default::default(), "bq"),
    );
    let (page, _) = portal_page();

    let row = RowRecord::new()
        .with("姓名", "王五")
        .with("ward", "3病区")
        .with("科室", "儿科");
    let outcome = FormController::new(&page, &MockDictionary::new(), &config)
        .process(&row)
        .await;

    assert!(!outcome.succeeded);
    let reason = outcome.failure_reason.unwrap();
    assert!(reason.contains("ward"), "{}", reason);

    // Filling stopped at the failure and the form was reset instead of submitted
    assert!(page.touched("patient_name"));
    assert!(!page.touched("department"));
    assert_eq!(page.clicks("submit"), 0);
    assert_eq!(page.clicks("reset"), 1);
}

#[tokio::test]
async fn test_invalid_value_resets_the_form() {
    let config = portal_config();
    let (page, _) = portal_page();

    let row = RowRecord::new().with("药品品种数", "三种");
    let outcome = FormController::new(&page, &MockDictionary::new(), &config)
        .process(&row)
        .await;

    assert!(!outcome.succeeded);
    assert!(outcome.failure_reason.unwrap().contains("drug_variety_count"));
    assert_eq!(page.clicks("reset"), 1);
}

#[tokio::test]
async fn test_missing_submit_control_fails_the_row() {
    let config = portal_config();
    let page = MockPage::new();
    page.add_id("brxm", "patient_name");
    page.add_id("btnReset", "reset");

    let row = RowRecord::new().with("姓名", "赵六");
    let outcome = FormController::new(&page, &MockDictionary::new(), &config)
        .process(&row)
        .await;

    assert!(!outcome.succeeded);
    assert!(outcome.failure_reason.unwrap().contains("submit"));
    assert_eq!(page.clicks("reset"), 1);
}

#[tokio::test]
async fn test_unconfigured_columns_are_skipped() {
    let config = portal_config();
    let (page, _) = portal_page();

    let row = RowRecord::new()
        .with("就诊卡号", "A0001")
        .with("抗菌药物名称", "头孢呋辛酯片");
    let outcome = FormController::new(&page, &MockDictionary::new(), &config)
        .process(&row)
        .await;

    assert!(outcome.succeeded);
    assert_eq!(page.clicks("submit"), 1);
    assert_eq!(page.actions().len(), 2);
}
