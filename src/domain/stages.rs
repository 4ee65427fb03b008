//! Per-stage data records and the requests that write them.
//!
//! Each stage keeps at most one record per job. The `*Fields` structs hold
//! the business fields an upsert overwrites; the `*Data` structs add the
//! row identity, document placeholders and timestamps, none of which an
//! upsert touches.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fields::{self, ContainerSize, FieldError};
use super::job::{JobId, UserId};

// ============================================================================
// Stage 1: job intake
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stage1Fields {
    pub job_no: String,
    pub job_date: Option<NaiveDate>,
    pub edi_job_no: Option<String>,
    pub edi_date: Option<NaiveDate>,
    pub consignee: Option<String>,
    pub shipper: Option<String>,
    pub port_of_discharge: Option<String>,
    pub final_place_of_delivery: Option<String>,
    pub port_of_loading: Option<String>,
    pub country_of_shipment: Option<String>,
    pub hbl_no: Option<String>,
    pub hbl_date: Option<NaiveDate>,
    pub mbl_no: Option<String>,
    pub mbl_date: Option<NaiveDate>,
    pub shipping_line: Option<String>,
    pub forwarder: Option<String>,
    pub weight: Option<f64>,
    pub packages: Option<i64>,
    pub invoice_no: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub gateway_igm: Option<String>,
    pub gateway_igm_date: Option<NaiveDate>,
    pub local_igm: Option<String>,
    pub local_igm_date: Option<NaiveDate>,
    pub commodity: Option<String>,
    pub eta: Option<NaiveDateTime>,
    pub current_status: Option<String>,
    pub container_no: Option<String>,
    pub container_size: Option<ContainerSize>,
    pub date_of_arrival: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage1Data {
    pub id: i64,
    pub job_id: JobId,
    #[serde(flatten)]
    pub fields: Stage1Fields,
    pub invoice_pl_doc: Option<String>,
    pub bl_doc: Option<String>,
    pub coo_doc: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to open a new job with its intake data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateJobRequest {
    pub job_no: String,
    pub job_date: String,
    pub edi_job_no: String,
    pub edi_date: String,
    pub consignee: String,
    pub shipper: String,
    pub port_of_discharge: String,
    pub final_place_of_delivery: String,
    pub port_of_loading: String,
    pub country_of_shipment: String,
    pub hbl_no: String,
    pub hbl_date: String,
    pub mbl_no: String,
    pub mbl_date: String,
    pub shipping_line: String,
    pub forwarder: String,
    pub weight: f64,
    pub packages: i64,
    pub invoice_no: String,
    pub invoice_date: String,
    pub gateway_igm: String,
    pub gateway_igm_date: String,
    pub local_igm: String,
    pub local_igm_date: String,
    pub commodity: String,
    pub eta: String,
    pub current_status: String,
    pub container_no: String,
    pub container_size: String,
    pub date_of_arrival: String,
    pub assigned_to_stage2: Option<UserId>,
    pub assigned_to_stage3: Option<UserId>,
    pub customer_id: Option<UserId>,
    pub notification_email: Option<String>,
}

impl CreateJobRequest {
    /// Convenience constructor for a request carrying only a job number
    pub fn new(job_no: impl Into<String>) -> Self {
        Self {
            job_no: job_no.into(),
            ..Default::default()
        }
    }

    pub fn to_fields(&self) -> Result<Stage1Fields, FieldError> {
        Ok(Stage1Fields {
            job_no: self.job_no.trim().to_string(),
            job_date: fields::date(&self.job_date),
            edi_job_no: fields::text(&self.edi_job_no),
            edi_date: fields::date(&self.edi_date),
            consignee: fields::text(&self.consignee),
            shipper: fields::text(&self.shipper),
            port_of_discharge: fields::text(&self.port_of_discharge),
            final_place_of_delivery: fields::text(&self.final_place_of_delivery),
            port_of_loading: fields::text(&self.port_of_loading),
            country_of_shipment: fields::text(&self.country_of_shipment),
            hbl_no: fields::text(&self.hbl_no),
            hbl_date: fields::date(&self.hbl_date),
            mbl_no: fields::text(&self.mbl_no),
            mbl_date: fields::date(&self.mbl_date),
            shipping_line: fields::text(&self.shipping_line),
            forwarder: fields::text(&self.forwarder),
            weight: Some(self.weight),
            packages: Some(self.packages),
            invoice_no: fields::text(&self.invoice_no),
            invoice_date: fields::date(&self.invoice_date),
            gateway_igm: fields::text(&self.gateway_igm),
            gateway_igm_date: fields::date(&self.gateway_igm_date),
            local_igm: fields::text(&self.local_igm),
            local_igm_date: fields::date(&self.local_igm_date),
            commodity: fields::text(&self.commodity),
            eta: fields::date_time(&self.eta),
            current_status: fields::text(&self.current_status),
            container_no: fields::text(&self.container_no),
            container_size: ContainerSize::from_field("container_size", &self.container_size)?,
            date_of_arrival: fields::date(&self.date_of_arrival),
        })
    }
}

// ============================================================================
// Stage 2: customs & documentation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stage2Fields {
    pub hsn_code: Option<String>,
    pub filing_requirement: Option<String>,
    pub checklist_sent_date: Option<NaiveDate>,
    pub approval_date: Option<NaiveDate>,
    pub bill_of_entry_no: Option<String>,
    pub bill_of_entry_date: Option<NaiveDate>,
    pub debit_note: Option<String>,
    pub debit_paid_by: Option<String>,
    pub duty_amount: f64,
    pub duty_paid_by: Option<String>,
    pub ocean_freight: f64,
    pub destination_charges: f64,
    pub original_doct_recd_date: Option<NaiveDate>,
    pub drn_no: Option<String>,
    pub irn_no: Option<String>,
    pub documents_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage2Data {
    pub id: i64,
    pub job_id: JobId,
    #[serde(flatten)]
    pub fields: Stage2Fields,
    pub document_1: Option<String>,
    pub document_2: Option<String>,
    pub document_3: Option<String>,
    pub document_4: Option<String>,
    pub document_5: Option<String>,
    pub document_6: Option<String>,
    pub query_upload: Option<String>,
    pub reply_upload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage2UpdateRequest {
    pub hsn_code: String,
    pub filing_requirement: String,
    pub checklist_sent_date: String,
    pub approval_date: String,
    pub bill_of_entry_no: String,
    pub bill_of_entry_date: String,
    pub debit_note: String,
    pub debit_paid_by: String,
    pub duty_amount: f64,
    pub duty_paid_by: String,
    pub ocean_freight: f64,
    pub destination_charges: f64,
    pub original_doct_recd_date: String,
    pub drn_no: String,
    pub irn_no: String,
    pub documents_type: String,
}

impl Stage2UpdateRequest {
    pub fn to_fields(&self) -> Stage2Fields {
        Stage2Fields {
            hsn_code: fields::text(&self.hsn_code),
            filing_requirement: fields::text(&self.filing_requirement),
            checklist_sent_date: fields::date(&self.checklist_sent_date),
            approval_date: fields::date(&self.approval_date),
            bill_of_entry_no: fields::text(&self.bill_of_entry_no),
            bill_of_entry_date: fields::date(&self.bill_of_entry_date),
            debit_note: fields::text(&self.debit_note),
            debit_paid_by: fields::text(&self.debit_paid_by),
            duty_amount: self.duty_amount,
            duty_paid_by: fields::text(&self.duty_paid_by),
            ocean_freight: self.ocean_freight,
            destination_charges: self.destination_charges,
            original_doct_recd_date: fields::date(&self.original_doct_recd_date),
            drn_no: fields::text(&self.drn_no),
            irn_no: fields::text(&self.irn_no),
            documents_type: fields::text(&self.documents_type),
        }
    }
}

// ============================================================================
// Stage 3: clearance & logistics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stage3Fields {
    pub exam_date: Option<NaiveDate>,
    pub out_of_charge: Option<NaiveDate>,
    pub clearance_exps: Option<f64>,
    pub stamp_duty: Option<f64>,
    pub custodian: Option<String>,
    pub offloading_charges: Option<f64>,
    pub transport_detention: Option<f64>,
    pub dispatch_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage3Data {
    pub id: i64,
    pub job_id: JobId,
    #[serde(flatten)]
    pub fields: Stage3Fields,
    pub bill_of_entry_upload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerFields {
    pub container_no: Option<String>,
    pub size: Option<ContainerSize>,
    pub vehicle_no: Option<String>,
    pub date_of_offloading: Option<NaiveDate>,
    pub empty_return_date: Option<NaiveDate>,
}

/// A container row. Ids change on every stage 3 update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage3Container {
    pub id: i64,
    pub job_id: JobId,
    #[serde(flatten)]
    pub fields: ContainerFields,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerRequest {
    pub container_no: String,
    pub size: String,
    pub vehicle_no: String,
    pub date_of_offloading: String,
    pub empty_return_date: String,
}

impl ContainerRequest {
    pub fn to_fields(&self) -> Result<ContainerFields, FieldError> {
        Ok(ContainerFields {
            container_no: fields::text(&self.container_no),
            size: ContainerSize::from_field("size", &self.size)?,
            vehicle_no: fields::text(&self.vehicle_no),
            date_of_offloading: fields::date(&self.date_of_offloading),
            empty_return_date: fields::date(&self.empty_return_date),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage3UpdateRequest {
    pub exam_date: String,
    pub out_of_charge: String,
    pub clearance_exps: f64,
    pub stamp_duty: f64,
    pub custodian: String,
    pub offloading_charges: f64,
    pub transport_detention: f64,
    pub dispatch_info: String,
    /// Replaces the job's whole container list
    pub containers: Vec<ContainerRequest>,
}

impl Stage3UpdateRequest {
    pub fn to_fields(&self) -> Stage3Fields {
        Stage3Fields {
            exam_date: fields::date(&self.exam_date),
            out_of_charge: fields::date(&self.out_of_charge),
            clearance_exps: Some(self.clearance_exps),
            stamp_duty: Some(self.stamp_duty),
            custodian: fields::text(&self.custodian),
            offloading_charges: Some(self.offloading_charges),
            transport_detention: Some(self.transport_detention),
            dispatch_info: fields::text(&self.dispatch_info),
        }
    }

    pub fn container_fields(&self) -> Result<Vec<ContainerFields>, FieldError> {
        self.containers.iter().map(ContainerRequest::to_fields).collect()
    }
}

// ============================================================================
// Stage 4: billing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stage4Fields {
    pub bill_no: Option<String>,
    pub bill_date: Option<NaiveDate>,
    pub amount_taxable: Option<f64>,
    pub gst_5_percent: Option<f64>,
    pub gst_18_percent: Option<f64>,
    pub bill_mail: Option<String>,
    pub bill_courier: Option<String>,
    pub courier_date: Option<NaiveDate>,
    pub acknowledge_date: Option<NaiveDate>,
    pub acknowledge_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage4Data {
    pub id: i64,
    pub job_id: JobId,
    #[serde(flatten)]
    pub fields: Stage4Fields,
    pub bill_copy_upload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage4UpdateRequest {
    pub bill_no: String,
    pub bill_date: String,
    pub amount_taxable: f64,
    pub gst_5_percent: f64,
    pub gst_18_percent: f64,
    pub bill_mail: String,
    pub bill_courier: String,
    pub courier_date: String,
    pub acknowledge_date: String,
    pub acknowledge_name: String,
}

impl Stage4UpdateRequest {
    /// Any non-empty acknowledge date completes the job, even one that is
    /// only whitespace or does not parse as a date.
    pub fn is_acknowledged(&self) -> bool {
        !self.acknowledge_date.is_empty()
    }

    pub fn to_fields(&self) -> Stage4Fields {
        Stage4Fields {
            bill_no: fields::text(&self.bill_no),
            bill_date: fields::date(&self.bill_date),
            amount_taxable: Some(self.amount_taxable),
            gst_5_percent: Some(self.gst_5_percent),
            gst_18_percent: Some(self.gst_18_percent),
            bill_mail: fields::text(&self.bill_mail),
            bill_courier: fields::text(&self.bill_courier),
            courier_date: fields::date(&self.courier_date),
            acknowledge_date: fields::date(&self.acknowledge_date),
            acknowledge_name: fields::text(&self.acknowledge_name),
        }
    }
}
