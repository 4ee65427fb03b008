//! Per-stage data tables.
//!
//! Stage 2-4 writes are native upserts keyed on `job_id`: every business
//! field is overwritten and `updated_at` bumped, while `created_at` and the
//! document columns keep whatever the row already had. Containers are
//! replaced wholesale.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{
    date_column, date_text, date_time_column, date_time_text, optional_enum_column, timestamp,
    timestamp_column, DatabaseError,
};
use crate::domain::fields::ContainerSize;
use crate::domain::{
    ContainerFields, JobId, Stage1Data, Stage1Fields, Stage2Data, Stage2Fields, Stage3Container,
    Stage3Data, Stage3Fields, Stage4Data, Stage4Fields,
};

// ============================================================================
// Stage 1
// ============================================================================

pub fn insert_stage1(
    conn: &Connection,
    job_id: JobId,
    f: &Stage1Fields,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let now = timestamp(now);
    conn.execute(
        "INSERT INTO stage1_data (
            job_id, job_no, job_date, edi_job_no, edi_date, consignee, shipper,
            port_of_discharge, final_place_of_delivery, port_of_loading, country_of_shipment,
            hbl_no, hbl_date, mbl_no, mbl_date, shipping_line, forwarder, weight, packages,
            invoice_no, invoice_date, gateway_igm, gateway_igm_date, local_igm, local_igm_date,
            commodity, eta, current_status, container_no, container_size, date_of_arrival,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?32)",
        params![
            job_id,
            f.job_no,
            date_text(f.job_date),
            f.edi_job_no,
            date_text(f.edi_date),
            f.consignee,
            f.shipper,
            f.port_of_discharge,
            f.final_place_of_delivery,
            f.port_of_loading,
            f.country_of_shipment,
            f.hbl_no,
            date_text(f.hbl_date),
            f.mbl_no,
            date_text(f.mbl_date),
            f.shipping_line,
            f.forwarder,
            f.weight,
            f.packages,
            f.invoice_no,
            date_text(f.invoice_date),
            f.gateway_igm,
            date_text(f.gateway_igm_date),
            f.local_igm,
            date_text(f.local_igm_date),
            f.commodity,
            date_time_text(f.eta),
            f.current_status,
            f.container_no,
            f.container_size.map(ContainerSize::as_str),
            date_text(f.date_of_arrival),
            now,
        ],
    )?;
    Ok(())
}

pub fn get_stage1(conn: &Connection, job_id: JobId) -> Result<Option<Stage1Data>, DatabaseError> {
    let data = conn
        .query_row(
            "SELECT * FROM stage1_data WHERE job_id = ?1",
            params![job_id],
            stage1_from_row,
        )
        .optional()?;
    Ok(data)
}

fn stage1_from_row(row: &Row<'_>) -> rusqlite::Result<Stage1Data> {
    Ok(Stage1Data {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        fields: Stage1Fields {
            job_no: row.get("job_no")?,
            job_date: date_column(row, "job_date")?,
            edi_job_no: row.get("edi_job_no")?,
            edi_date: date_column(row, "edi_date")?,
            consignee: row.get("consignee")?,
            shipper: row.get("shipper")?,
            port_of_discharge: row.get("port_of_discharge")?,
            final_place_of_delivery: row.get("final_place_of_delivery")?,
            port_of_loading: row.get("port_of_loading")?,
            country_of_shipment: row.get("country_of_shipment")?,
            hbl_no: row.get("hbl_no")?,
            hbl_date: date_column(row, "hbl_date")?,
            mbl_no: row.get("mbl_no")?,
            mbl_date: date_column(row, "mbl_date")?,
            shipping_line: row.get("shipping_line")?,
            forwarder: row.get("forwarder")?,
            weight: row.get("weight")?,
            packages: row.get("packages")?,
            invoice_no: row.get("invoice_no")?,
            invoice_date: date_column(row, "invoice_date")?,
            gateway_igm: row.get("gateway_igm")?,
            gateway_igm_date: date_column(row, "gateway_igm_date")?,
            local_igm: row.get("local_igm")?,
            local_igm_date: date_column(row, "local_igm_date")?,
            commodity: row.get("commodity")?,
            eta: date_time_column(row, "eta")?,
            current_status: row.get("current_status")?,
            container_no: row.get("container_no")?,
            container_size: optional_enum_column(row, "container_size", ContainerSize::parse)?,
            date_of_arrival: date_column(row, "date_of_arrival")?,
        },
        invoice_pl_doc: row.get("invoice_pl_doc")?,
        bl_doc: row.get("bl_doc")?,
        coo_doc: row.get("coo_doc")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

// ============================================================================
// Stage 2
// ============================================================================

pub fn upsert_stage2(
    conn: &Connection,
    job_id: JobId,
    f: &Stage2Fields,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let now = timestamp(now);
    conn.execute(
        "INSERT INTO stage2_data (
            job_id, hsn_code, filing_requirement, checklist_sent_date, approval_date,
            bill_of_entry_no, bill_of_entry_date, debit_note, debit_paid_by, duty_amount,
            duty_paid_by, ocean_freight, destination_charges, original_doct_recd_date,
            drn_no, irn_no, documents_type, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?18)
         ON CONFLICT(job_id) DO UPDATE SET
            hsn_code = excluded.hsn_code,
            filing_requirement = excluded.filing_requirement,
            checklist_sent_date = excluded.checklist_sent_date,
            approval_date = excluded.approval_date,
            bill_of_entry_no = excluded.bill_of_entry_no,
            bill_of_entry_date = excluded.bill_of_entry_date,
            debit_note = excluded.debit_note,
            debit_paid_by = excluded.debit_paid_by,
            duty_amount = excluded.duty_amount,
            duty_paid_by = excluded.duty_paid_by,
            ocean_freight = excluded.ocean_freight,
            destination_charges = excluded.destination_charges,
            original_doct_recd_date = excluded.original_doct_recd_date,
            drn_no = excluded.drn_no,
            irn_no = excluded.irn_no,
            documents_type = excluded.documents_type,
            updated_at = excluded.updated_at",
        params![
            job_id,
            f.hsn_code,
            f.filing_requirement,
            date_text(f.checklist_sent_date),
            date_text(f.approval_date),
            f.bill_of_entry_no,
            date_text(f.bill_of_entry_date),
            f.debit_note,
            f.debit_paid_by,
            f.duty_amount,
            f.duty_paid_by,
            f.ocean_freight,
            f.destination_charges,
            date_text(f.original_doct_recd_date),
            f.drn_no,
            f.irn_no,
            f.documents_type,
            now,
        ],
    )?;
    Ok(())
}

pub fn get_stage2(conn: &Connection, job_id: JobId) -> Result<Option<Stage2Data>, DatabaseError> {
    let data = conn
        .query_row(
            "SELECT * FROM stage2_data WHERE job_id = ?1",
            params![job_id],
            stage2_from_row,
        )
        .optional()?;
    Ok(data)
}

fn stage2_from_row(row: &Row<'_>) -> rusqlite::Result<Stage2Data> {
    Ok(Stage2Data {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        fields: Stage2Fields {
            hsn_code: row.get("hsn_code")?,
            filing_requirement: row.get("filing_requirement")?,
            checklist_sent_date: date_column(row, "checklist_sent_date")?,
            approval_date: date_column(row, "approval_date")?,
            bill_of_entry_no: row.get("bill_of_entry_no")?,
            bill_of_entry_date: date_column(row, "bill_of_entry_date")?,
            debit_note: row.get("debit_note")?,
            debit_paid_by: row.get("debit_paid_by")?,
            duty_amount: row.get("duty_amount")?,
            duty_paid_by: row.get("duty_paid_by")?,
            ocean_freight: row.get("ocean_freight")?,
            destination_charges: row.get("destination_charges")?,
            original_doct_recd_date: date_column(row, "original_doct_recd_date")?,
            drn_no: row.get("drn_no")?,
            irn_no: row.get("irn_no")?,
            documents_type: row.get("documents_type")?,
        },
        document_1: row.get("document_1")?,
        document_2: row.get("document_2")?,
        document_3: row.get("document_3")?,
        document_4: row.get("document_4")?,
        document_5: row.get("document_5")?,
        document_6: row.get("document_6")?,
        query_upload: row.get("query_upload")?,
        reply_upload: row.get("reply_upload")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

// ============================================================================
// Stage 3
// ============================================================================

pub fn upsert_stage3(
    conn: &Connection,
    job_id: JobId,
    f: &Stage3Fields,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let now = timestamp(now);
    conn.execute(
        "INSERT INTO stage3_data (
            job_id, exam_date, out_of_charge, clearance_exps, stamp_duty, custodian,
            offloading_charges, transport_detention, dispatch_info, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
         ON CONFLICT(job_id) DO UPDATE SET
            exam_date = excluded.exam_date,
            out_of_charge = excluded.out_of_charge,
            clearance_exps = excluded.clearance_exps,
            stamp_duty = excluded.stamp_duty,
            custodian = excluded.custodian,
            offloading_charges = excluded.offloading_charges,
            transport_detention = excluded.transport_detention,
            dispatch_info = excluded.dispatch_info,
            updated_at = excluded.updated_at",
        params![
            job_id,
            date_text(f.exam_date),
            date_text(f.out_of_charge),
            f.clearance_exps,
            f.stamp_duty,
            f.custodian,
            f.offloading_charges,
            f.transport_detention,
            f.dispatch_info,
            now,
        ],
    )?;
    Ok(())
}

pub fn get_stage3(conn: &Connection, job_id: JobId) -> Result<Option<Stage3Data>, DatabaseError> {
    let data = conn
        .query_row(
            "SELECT * FROM stage3_data WHERE job_id = ?1",
            params![job_id],
            |row| {
                Ok(Stage3Data {
                    id: row.get("id")?,
                    job_id: row.get("job_id")?,
                    fields: Stage3Fields {
                        exam_date: date_column(row, "exam_date")?,
                        out_of_charge: date_column(row, "out_of_charge")?,
                        clearance_exps: row.get("clearance_exps")?,
                        stamp_duty: row.get("stamp_duty")?,
                        custodian: row.get("custodian")?,
                        offloading_charges: row.get("offloading_charges")?,
                        transport_detention: row.get("transport_detention")?,
                        dispatch_info: row.get("dispatch_info")?,
                    },
                    bill_of_entry_upload: row.get("bill_of_entry_upload")?,
                    created_at: timestamp_column(row, "created_at")?,
                    updated_at: timestamp_column(row, "updated_at")?,
                })
            },
        )
        .optional()?;
    Ok(data)
}

/// Delete every container of the job, then insert `containers` in order.
///
/// Container ids are not stable across calls.
pub fn replace_containers(
    conn: &Connection,
    job_id: JobId,
    containers: &[ContainerFields],
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let now = timestamp(now);
    let removed = conn.execute(
        "DELETE FROM stage3_containers WHERE job_id = ?1",
        params![job_id],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO stage3_containers (
            job_id, container_no, size, vehicle_no, date_of_offloading, empty_return_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for c in containers {
        stmt.execute(params![
            job_id,
            c.container_no,
            c.size.map(ContainerSize::as_str),
            c.vehicle_no,
            date_text(c.date_of_offloading),
            date_text(c.empty_return_date),
            now,
        ])?;
    }

    tracing::debug!(job_id, removed, inserted = containers.len(), "Replaced stage 3 containers");
    Ok(containers.len())
}

pub fn list_containers(conn: &Connection, job_id: JobId) -> Result<Vec<Stage3Container>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM stage3_containers WHERE job_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![job_id], |row| {
        Ok(Stage3Container {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            fields: ContainerFields {
                container_no: row.get("container_no")?,
                size: optional_enum_column(row, "size", ContainerSize::parse)?,
                vehicle_no: row.get("vehicle_no")?,
                date_of_offloading: date_column(row, "date_of_offloading")?,
                empty_return_date: date_column(row, "empty_return_date")?,
            },
            created_at: timestamp_column(row, "created_at")?,
        })
    })?;

    let mut containers = Vec::new();
    for row in rows {
        containers.push(row?);
    }
    Ok(containers)
}

// ============================================================================
// Stage 4
// ============================================================================

pub fn upsert_stage4(
    conn: &Connection,
    job_id: JobId,
    f: &Stage4Fields,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let now = timestamp(now);
    conn.execute(
        "INSERT INTO stage4_data (
            job_id, bill_no, bill_date, amount_taxable, gst_5_percent, gst_18_percent,
            bill_mail, bill_courier, courier_date, acknowledge_date, acknowledge_name,
            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
         ON CONFLICT(job_id) DO UPDATE SET
            bill_no = excluded.bill_no,
            bill_date = excluded.bill_date,
            amount_taxable = excluded.amount_taxable,
            gst_5_percent = excluded.gst_5_percent,
            gst_18_percent = excluded.gst_18_percent,
            bill_mail = excluded.bill_mail,
            bill_courier = excluded.bill_courier,
            courier_date = excluded.courier_date,
            acknowledge_date = excluded.acknowledge_date,
            acknowledge_name = excluded.acknowledge_name,
            updated_at = excluded.updated_at",
        params![
            job_id,
            f.bill_no,
            date_text(f.bill_date),
            f.amount_taxable,
            f.gst_5_percent,
            f.gst_18_percent,
            f.bill_mail,
            f.bill_courier,
            date_text(f.courier_date),
            date_text(f.acknowledge_date),
            f.acknowledge_name,
            now,
        ],
    )?;
    Ok(())
}

pub fn get_stage4(conn: &Connection, job_id: JobId) -> Result<Option<Stage4Data>, DatabaseError> {
    let data = conn
        .query_row(
            "SELECT * FROM stage4_data WHERE job_id = ?1",
            params![job_id],
            |row| {
                Ok(Stage4Data {
                    id: row.get("id")?,
                    job_id: row.get("job_id")?,
                    fields: Stage4Fields {
                        bill_no: row.get("bill_no")?,
                        bill_date: date_column(row, "bill_date")?,
                        amount_taxable: row.get("amount_taxable")?,
                        gst_5_percent: row.get("gst_5_percent")?,
                        gst_18_percent: row.get("gst_18_percent")?,
                        bill_mail: row.get("bill_mail")?,
                        bill_courier: row.get("bill_courier")?,
                        courier_date: date_column(row, "courier_date")?,
                        acknowledge_date: date_column(row, "acknowledge_date")?,
                        acknowledge_name: row.get("acknowledge_name")?,
                    },
                    bill_copy_upload: row.get("bill_copy_upload")?,
                    created_at: timestamp_column(row, "created_at")?,
                    updated_at: timestamp_column(row, "updated_at")?,
                })
            },
        )
        .optional()?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{jobs, Database, Deadline};
    use chrono::{NaiveDate, TimeZone};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 9, minute, 0).unwrap()
    }

    fn seeded() -> (Database, JobId) {
        let db = Database::open_in_memory().unwrap();
        let job_id = db
            .with_conn(Deadline::none(), |conn| {
                conn.execute(
                    "INSERT INTO users (username, password_hash, designation, role, created_at)
                     VALUES ('admin', '', 'Admin', 'admin', '2024-01-01T00:00:00.000000Z')",
                    [],
                )?;
                let new_job = jobs::NewJob {
                    job_no: "JOB1".to_string(),
                    created_by: conn.last_insert_rowid(),
                    ..Default::default()
                };
                jobs::insert_job(conn, &new_job, at(0))
            })
            .unwrap();
        (db, job_id)
    }

    #[test]
    fn stage2_upsert_overwrites_fields_and_keeps_created_at() {
        let (db, job_id) = seeded();
        db.with_conn(Deadline::none(), |conn| {
            let first = Stage2Fields {
                hsn_code: Some("8501".to_string()),
                duty_paid_by: Some("Consignee".to_string()),
                duty_amount: 100.0,
                ..Default::default()
            };
            upsert_stage2(conn, job_id, &first, at(1))?;
            conn.execute(
                "UPDATE stage2_data SET document_1 = 'docs/be.pdf' WHERE job_id = ?1",
                params![job_id],
            )?;

            let second = Stage2Fields {
                hsn_code: Some("8502".to_string()),
                duty_amount: 150.5,
                ..Default::default()
            };
            upsert_stage2(conn, job_id, &second, at(2))?;

            let data = get_stage2(conn, job_id)?.unwrap();
            assert_eq!(data.fields.hsn_code.as_deref(), Some("8502"));
            assert_eq!(data.fields.duty_paid_by, None);
            assert_eq!(data.fields.duty_amount, 150.5);
            assert_eq!(data.document_1.as_deref(), Some("docs/be.pdf"));
            assert_eq!(data.created_at, at(1));
            assert_eq!(data.updated_at, at(2));

            let rows: i64 = conn.query_row(
                "SELECT COUNT(*) FROM stage2_data WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )?;
            assert_eq!(rows, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn containers_are_fully_replaced() {
        let (db, job_id) = seeded();
        db.with_conn(Deadline::none(), |conn| {
            let first = vec![
                ContainerFields {
                    container_no: Some("MSCU1234567".to_string()),
                    size: Some(ContainerSize::Forty),
                    ..Default::default()
                },
                ContainerFields {
                    container_no: Some("MSCU7654321".to_string()),
                    ..Default::default()
                },
            ];
            replace_containers(conn, job_id, &first, at(1))?;
            let before = list_containers(conn, job_id)?;
            assert_eq!(before.len(), 2);

            let second = vec![ContainerFields {
                container_no: Some("TGHU0000001".to_string()),
                date_of_offloading: NaiveDate::from_ymd_opt(2024, 2, 1),
                ..Default::default()
            }];
            replace_containers(conn, job_id, &second, at(2))?;

            let after = list_containers(conn, job_id)?;
            assert_eq!(after.len(), 1);
            assert_eq!(after[0].fields, second[0]);
            assert!(before.iter().all(|c| c.id != after[0].id));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn stage1_round_trips_parsed_fields() {
        let (db, job_id) = seeded();
        let stored = db
            .with_conn(Deadline::none(), |conn| get_stage1(conn, job_id))
            .unwrap();
        // insert_job does not write stage 1 data on its own
        assert!(stored.is_none());

        let fields = Stage1Fields {
            job_no: "JOB1".to_string(),
            job_date: NaiveDate::from_ymd_opt(2024, 1, 5),
            eta: NaiveDate::from_ymd_opt(2024, 1, 20).and_then(|d| d.and_hms_opt(6, 30, 0)),
            weight: Some(1250.5),
            packages: Some(12),
            container_size: Some(ContainerSize::Lcl),
            ..Default::default()
        };
        let loaded = db
            .with_conn(Deadline::none(), |conn| {
                insert_stage1(conn, job_id, &fields, at(0))?;
                get_stage1(conn, job_id)
            })
            .unwrap()
            .unwrap();
        assert_eq!(loaded.fields, fields);
        assert_eq!(loaded.bl_doc, None);
    }

    #[test]
    fn stage_rows_cascade_with_job() {
        let (db, job_id) = seeded();
        db.with_conn(Deadline::none(), |conn| {
            upsert_stage3(conn, job_id, &Stage3Fields::default(), at(1))?;
            upsert_stage4(conn, job_id, &Stage4Fields::default(), at(2))?;
            replace_containers(conn, job_id, &[ContainerFields::default()], at(1))?;

            conn.execute("DELETE FROM pipeline_jobs WHERE id = ?1", params![job_id])?;

            assert!(get_stage3(conn, job_id)?.is_none());
            assert!(get_stage4(conn, job_id)?.is_none());
            assert!(list_containers(conn, job_id)?.is_empty());
            Ok(())
        })
        .unwrap();
    }
}
