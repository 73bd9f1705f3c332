//! End-to-end batch run: fixture CSVs and scrape results in, all three
//! validated datasets out.

use std::fs;
use std::path::Path;

use edt_core::ValidationStatus;
use edt_pipeline::{Pipeline, PipelineConfig};
use tempfile::tempdir;

fn write(path: &Path, contents: &str) {
    fs::write(path, contents).expect("writing fixture");
}

#[tokio::test]
async fn full_batch_produces_all_three_datasets() {
    let dir = tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");
    fs::create_dir_all(&data_dir).expect("creating data dir");

    let survey_csv = data_dir.join("eavs_jurisdictions.csv");
    write(
        &survey_csv,
        "State_Abbr,State_Full,A1b,A1c,C1a,C2a,F1a\n\
         MI,Michigan,100,20,400,300,90\n\
         MI,Michigan,50,10,-88,DNA (DATA NOT AVAILABLE),60\n\
         OH,Ohio,500,25,0,,400\n",
    );

    let statutes_csv = data_dir.join("statute_rules.csv");
    write(
        &statutes_csv,
        "state_code,state_name,primary_date_rule,primary_date_2026,general_date_rule,\
         general_date_2026,statute_reference,source_url,confidence_level,notes\n\
         MI,Michigan,First Tuesday of August,2026-08-04,First Tuesday of November,2026-11-03,\
         Mich. Comp. Laws § 168.534,https://law.example/mi,High,\n\
         TX,Texas,First Tuesday of March,2026-03-03,First Tuesday of November,2026-11-03,\
         Tex. Elec. Code § 41.007,https://law.example/tx,High,\n",
    );

    let specials_csv = data_dir.join("special_elections.csv");
    write(
        &specials_csv,
        "id,state_code,state_name,office,district,level,reason,vacancy_date,primary_date,\
         general_date,runoff_date,status,confidence,source_url,notes\n\
         tx-18,TX,Texas,US House,18,federal,Vacancy,,,2099-11-02,,scheduled,High,,\n\
         oh-sup,OH,Ohio,Supreme Court,,statewide,Retirement,,,,,announced,Low,,\n",
    );

    // A pre-existing scrape run whose MI primary disagrees with the statute.
    write(
        &data_dir.join("sos_scraped.json"),
        r#"{
  "MI": {
    "state_code": "MI",
    "state_name": "Michigan",
    "sos_url": "https://sos.example/mi",
    "calendar_url": "https://sos.example/mi/calendar",
    "calendar_type": "html",
    "scraped_at": "2026-07-01T12:00:00Z",
    "dates_found": [],
    "primary_date": "2026-08-05",
    "general_date": "2026-11-03",
    "scrape_status": "completed",
    "source": "scraped"
  }
}"#,
    );

    let config = PipelineConfig {
        data_dir: data_dir.clone(),
        sources_file: data_dir.join("sources.yaml"),
        survey_csv,
        statutes_csv,
        specials_csv,
        user_agent: "edt-test/0".to_string(),
        http_timeout_secs: 5,
        target_year: 2026,
    };
    let pipeline = Pipeline::new(config);

    let summary = pipeline.run_build().await.expect("batch run");
    assert_eq!(summary.survey_states, 2);
    assert_eq!(summary.states_validated, 2);
    assert_eq!(summary.discrepancy_count, 1);
    assert_eq!(summary.special_elections, 2);
    assert_eq!(summary.datasets.len(), 3);

    let dates = pipeline.store().load_election_dates().await.expect("dates");
    let mi = dates.state("MI").expect("MI record");
    assert_eq!(mi.next_primary.date, "2026-08-04".parse().unwrap());
    assert_eq!(mi.validation.status, ValidationStatus::DiscrepancyResolved);
    assert_eq!(mi.sources.len(), 2);
    let tx = dates.state("TX").expect("TX record");
    assert_eq!(tx.validation.status, ValidationStatus::Validated);
    assert_eq!(tx.sources.len(), 1);

    let survey = pipeline.store().load_survey().await.expect("survey");
    let mi = &survey.states["MI"];
    assert_eq!(mi.jurisdiction_count, 2);
    assert_eq!(mi.voter_registration.total_active, Some(150));
    assert_eq!(mi.voter_registration.total_registered, Some(180));
    assert_eq!(mi.mail_voting.return_rate, Some(75.0));
    // OH transmitted nothing by mail: the rate is absent, not zero.
    let oh = &survey.states["OH"];
    assert_eq!(oh.mail_voting.ballots_transmitted, None);
    assert_eq!(oh.mail_voting.return_rate, None);

    let specials = pipeline
        .store()
        .load_special_elections()
        .await
        .expect("specials");
    assert_eq!(specials.metadata.election_count, 2);
    assert_eq!(specials.special_elections[0].id, "tx-18");
    assert_eq!(specials.special_elections[1].id, "oh-sup");
    assert_eq!(specials.by_state["TX"], vec!["tx-18".to_string()]);
}
